//! Model provider abstraction.
//!
//! The guardrail core treats the generative backend as an opaque
//! `generate(prompt) -> text | error` capability behind the
//! [`ModelProvider`] trait. The shipped implementation is
//! [`gemini::GeminiProvider`]; tests substitute mocks.

use async_trait::async_trait;
use thiserror::Error;

pub mod gemini;

/// Errors surfaced by a model backend.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Transport-level failure reaching the provider.
    #[error("network error: {0}")]
    Network(String),
    /// The provider rejected the request for quota reasons.
    #[error("rate limited by provider")]
    RateLimit,
    /// The configured API key was rejected.
    #[error("invalid or missing API key")]
    InvalidKey,
    /// Anything else, including malformed responses.
    #[error("model backend error: {0}")]
    Unknown(String),
}

/// Opaque generative-model capability consumed by the pipeline.
///
/// Implementations must be `Send + Sync`; the pipeline shares one provider
/// across turns and bounds each call with its own timeout.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Generate a completion for the composed prompt.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] on transport, quota, credential, or parse
    /// failure.
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;

    /// The model identifier this provider is configured for.
    fn model_id(&self) -> &str;
}
