use std::time::Duration;

use async_trait::async_trait;
use pentarch_common::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

const RETRYABLE_MARKERS: &[&str] = &[
    "429",
    "rate limit",
    "500",
    "502",
    "503",
    "504",
    "server error",
    "internal server error",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Wraps a client so transient provider failures are retried with
/// exponential backoff. Non-retryable errors pass through on the
/// first attempt.
pub struct RetryingClient<T: LlmClient> {
    inner: T,
    config: RetryConfig,
}

impl<T: LlmClient> RetryingClient<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    fn is_retryable(error_msg: &str) -> bool {
        let lower = error_msg.to_lowercase();
        RETRYABLE_MARKERS.iter().any(|marker| lower.contains(marker))
    }

    /// Looks for a "retry-after: N" hint in the error text and returns
    /// the delay in milliseconds.
    fn parse_retry_after(error_msg: &str) -> Option<u64> {
        let lower = error_msg.to_lowercase();
        let pos = lower.find("retry-after")?;
        for word in error_msg[pos..].split_whitespace().skip(1) {
            let cleaned = word.trim_end_matches(|c: char| !c.is_ascii_digit());
            if let Ok(secs) = cleaned.parse::<u64>() {
                return Some(secs * 1000);
            }
        }
        None
    }

    fn compute_delay(&self, attempt: u32) -> u64 {
        let base = self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32);
        let jitter = (base * 0.1 * rand_jitter(attempt)) as u64;
        let delay = (base as u64).saturating_add(jitter);
        delay.min(self.config.max_delay_ms)
    }
}

/// Deterministic jitter derived from the attempt number.
fn rand_jitter(attempt: u32) -> f64 {
    let x = attempt.wrapping_mul(2654435761);
    (x % 100) as f64 / 100.0
}

#[async_trait]
impl<T: LlmClient> LlmClient for RetryingClient<T> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let message = e.to_string();
                    if attempt >= self.config.max_retries || !Self::is_retryable(&message) {
                        return Err(e);
                    }

                    let delay = Self::parse_retry_after(&message)
                        .unwrap_or_else(|| self.compute_delay(attempt));

                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay,
                        error = %message,
                        "Retrying LLM request"
                    );

                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
            }
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
