//! LLM provider clients for the Pentarch pipeline.
//!
//! One shared [`LlmClient`] is built from configuration and injected
//! into the stages that need it. Provider clients are wrapped in a
//! retry layer and a concurrency limiter, so callers see a single
//! `complete` call regardless of transport behavior.

pub mod anthropic;
pub mod client;
pub mod config;
pub mod openai;
pub mod retry;

pub use anthropic::AnthropicClient;
pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};
pub use config::{build_llm_client, LlmConfig, SemaphoredClient};
pub use openai::OpenAiClient;
pub use retry::{RetryConfig, RetryingClient};
