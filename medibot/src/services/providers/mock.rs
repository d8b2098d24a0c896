//! Mock provider implementation for tests and offline runs.

use super::{
    FinishReason, GenerationParams, MediaPart, ProviderError, ProviderResponse, TextProvider,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What the mock returns from `generate`.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Fill every required field of the requested schema with placeholder text.
    SchemaFill,
    /// Return this text as-is.
    Respond(String),
    /// Fail with an API error carrying this message.
    Fail(String),
}

/// Mock text provider.
pub struct MockTextProvider {
    behavior: MockBehavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockTextProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockTextProvider {
    fn default() -> Self {
        Self::new(MockBehavior::SchemaFill)
    }
}

fn fill_schema(schema: Option<&Value>, prompt: &str) -> String {
    let required = schema
        .and_then(|s| s.get("required"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if required.is_empty() {
        return format!("Mock response for: {}", prompt);
    }

    let object: Map<String, Value> = required
        .iter()
        .filter_map(Value::as_str)
        .map(|field| (field.to_string(), Value::String(format!("Mock {}", field))))
        .collect();

    Value::Object(object).to_string()
}

#[async_trait]
impl TextProvider for MockTextProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(
        &self,
        prompt: &str,
        _media: &[MediaPart],
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let text = match &self.behavior {
            MockBehavior::SchemaFill => fill_schema(params.output_schema.as_ref(), prompt),
            MockBehavior::Respond(text) => text.clone(),
            MockBehavior::Fail(message) => return Err(ProviderError::ApiError(message.clone())),
        };

        Ok(ProviderResponse {
            output_tokens: text.len() as i32 / 4,
            text: Some(text),
            input_tokens: prompt.len() as i32 / 4,
            finish_reason: FinishReason::Complete,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        match &self.behavior {
            MockBehavior::Fail(message) => Err(ProviderError::NotConfigured(message.clone())),
            _ => Ok(()),
        }
    }
}
