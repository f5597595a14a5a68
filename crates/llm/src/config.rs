use std::sync::Arc;

use async_trait::async_trait;
use pentarch_common::{PentarchError, Result};
use serde::{Deserialize, Serialize};

use crate::anthropic::AnthropicClient;
use crate::client::{LlmClient, LlmRequest, LlmResponse};
use crate::openai::OpenAiClient;
use crate::retry::{RetryConfig, RetryingClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_max_concurrent() -> usize {
    2
}

/// Fills in configured default sampling parameters on requests that do
/// not set their own.
struct DefaultingClient<T: LlmClient> {
    inner: T,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[async_trait]
impl<T: LlmClient> LlmClient for DefaultingClient<T> {
    async fn complete(&self, mut request: LlmRequest) -> Result<LlmResponse> {
        if request.temperature.is_none() {
            request.temperature = self.temperature;
        }
        if request.max_tokens.is_none() {
            request.max_tokens = self.max_tokens;
        }
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Caps how many requests may be in flight at once against the
/// provider.
pub struct SemaphoredClient {
    inner: Arc<dyn LlmClient>,
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl SemaphoredClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self {
            inner,
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent)),
        }
    }
}

#[async_trait]
impl LlmClient for SemaphoredClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| PentarchError::Llm(format!("Semaphore acquire failed: {e}")))?;
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// API key from the config file, falling back to the provider's
/// conventional environment variable.
fn resolve_api_key(config: &LlmConfig) -> Option<String> {
    if let Some(ref key) = config.api_key {
        return Some(key.clone());
    }
    let var = match config.provider.as_str() {
        "openai" => "OPENAI_API_KEY",
        "anthropic" => "ANTHROPIC_API_KEY",
        _ => return None,
    };
    std::env::var(var).ok()
}

/// Builds the shared client the pipeline injects into its agents:
/// provider client, configured sampling defaults, retry layer, and a
/// concurrency cap, in that order.
pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let api_key = resolve_api_key(config);

    let base_client: Box<dyn LlmClient> = match config.provider.as_str() {
        "openai" => Box::new(OpenAiClient::new(
            config.api_url.clone(),
            config.model.clone(),
            api_key,
        )),
        "anthropic" => {
            let api_key = api_key.ok_or_else(|| {
                PentarchError::Config("Anthropic requires an API key".to_string())
            })?;
            Box::new(AnthropicClient::new(config.model.clone(), api_key))
        }
        other => {
            return Err(PentarchError::Config(format!(
                "Unknown LLM provider: {other}"
            )));
        }
    };

    let defaulting = DefaultingClient {
        inner: base_client,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };

    let retrying: Box<dyn LlmClient> =
        Box::new(RetryingClient::new(defaulting, config.retry.clone()));

    let semaphored = SemaphoredClient::new(Arc::from(retrying), config.max_concurrent_requests);

    Ok(Arc::new(semaphored))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_CONFIG: &str = r#"
provider = "openai"
model = "gpt-4o"
api_url = "http://localhost:11434"
max_concurrent_requests = 4

[retry]
max_retries = 5
initial_delay_ms = 1000
max_delay_ms = 60000
backoff_multiplier = 3.0
"#;

    #[test]
    fn deserialize_config_from_toml() {
        let config: LlmConfig = toml::from_str(TOML_CONFIG).unwrap();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.api_url.as_deref(), Some("http://localhost:11434"));
        assert!(config.api_key.is_none());
        assert_eq!(config.max_concurrent_requests, 4);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 1000);
    }

    #[test]
    fn deserialize_config_defaults() {
        let toml_str = r#"
provider = "anthropic"
model = "claude-sonnet-4-20250514"
api_key = "sk-ant-test"
"#;
        let config: LlmConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_concurrent_requests, 2);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay_ms, 500);
    }

    fn minimal_config(provider: &str, model: &str, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: provider.to_string(),
            model: model.to_string(),
            api_key: api_key.map(String::from),
            api_url: None,
            temperature: None,
            max_tokens: None,
            max_concurrent_requests: 2,
            retry: RetryConfig::default(),
        }
    }

    #[test]
    fn build_openai_client() {
        let client = build_llm_client(&minimal_config("openai", "gpt-4o", None)).unwrap();
        assert_eq!(client.model_name(), "gpt-4o");
    }

    #[test]
    fn build_anthropic_client() {
        let config = minimal_config("anthropic", "claude-sonnet-4-20250514", Some("sk-ant-test"));
        let client = build_llm_client(&config).unwrap();
        assert_eq!(client.model_name(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn build_anthropic_without_key_fails() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        let config = minimal_config("anthropic", "claude-sonnet-4-20250514", None);
        assert!(build_llm_client(&config).is_err());
    }

    #[test]
    fn build_unknown_provider_fails() {
        let config = minimal_config("gemini", "gemini-pro", None);
        assert!(build_llm_client(&config).is_err());
    }

    #[tokio::test]
    async fn configured_defaults_fill_unset_request_fields() {
        use std::sync::Mutex;

        struct CapturingClient {
            last: Arc<Mutex<Option<LlmRequest>>>,
        }

        #[async_trait]
        impl LlmClient for CapturingClient {
            async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
                *self.last.lock().unwrap() = Some(request);
                Ok(LlmResponse {
                    content: "ok".to_string(),
                    model: "test".to_string(),
                    usage: None,
                    finish_reason: None,
                })
            }
            fn model_name(&self) -> &str {
                "test"
            }
        }

        let last = Arc::new(Mutex::new(None));
        let client = DefaultingClient {
            inner: CapturingClient { last: last.clone() },
            temperature: Some(0.4),
            max_tokens: Some(2048),
        };

        client.complete(LlmRequest::new("hi")).await.unwrap();
        let seen = last.lock().unwrap().clone().unwrap();
        assert_eq!(seen.temperature, Some(0.4));
        assert_eq!(seen.max_tokens, Some(2048));

        client
            .complete(LlmRequest::new("hi").with_temperature(0.9))
            .await
            .unwrap();
        let seen = last.lock().unwrap().clone().unwrap();
        assert_eq!(seen.temperature, Some(0.9));
    }

    #[tokio::test]
    async fn semaphored_client_limits_concurrency() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingClient {
            concurrent: Arc<AtomicU32>,
            max_seen: Arc<AtomicU32>,
        }

        #[async_trait]
        impl LlmClient for CountingClient {
            async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
                let current = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                self.concurrent.fetch_sub(1, Ordering::SeqCst);
                Ok(LlmResponse {
                    content: "ok".to_string(),
                    model: "test".to_string(),
                    usage: None,
                    finish_reason: None,
                })
            }
            fn model_name(&self) -> &str {
                "test"
            }
        }

        let concurrent = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let inner = Arc::new(CountingClient {
            concurrent: concurrent.clone(),
            max_seen: max_seen.clone(),
        });

        let semaphored = Arc::new(SemaphoredClient::new(inner, 2));

        let mut handles = vec![];
        for _ in 0..6 {
            let client = semaphored.clone();
            handles.push(tokio::spawn(async move {
                client.complete(LlmRequest::new("work")).await.unwrap();
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
