//! AI provider abstractions and implementations.
//!
//! This module provides a trait-based abstraction for the prompt-execution
//! backend, allowing easy swapping between Gemini and a mock.

pub mod gemini;
pub mod mock;

use crate::models::data_uri::DataUri;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::InvalidRequest(_) => "invalid_request",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::ContentFiltered => "content_filtered",
            ProviderError::NetworkError(_) => "network_error",
        }
    }
}

/// Result of a provider response.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Generated text (JSON when an output schema was requested).
    pub text: Option<String>,

    /// Input tokens consumed.
    pub input_tokens: i32,

    /// Output tokens generated.
    pub output_tokens: i32,

    /// Finish reason.
    pub finish_reason: FinishReason,
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    ContentFilter,
    Error,
}

/// Generation parameters for AI requests.
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    /// Schema the output must conform to; implies JSON output.
    pub output_schema: Option<Value>,
}

/// A document passed inline with the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPart {
    pub mime_type: String,

    /// Base64 payload.
    pub data: String,
}

impl From<&DataUri> for MediaPart {
    fn from(uri: &DataUri) -> Self {
        Self {
            mime_type: uri.mime_type().to_string(),
            data: uri.base64_data().to_string(),
        }
    }
}

/// Trait for text/JSON generation providers (e.g., Gemini).
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Provider name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Generate a response for the prompt and any attached media.
    async fn generate(
        &self,
        prompt: &str,
        media: &[MediaPart],
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ProviderError>;
}
