//! Prompt-execution flows: prescription, lab results and health query.
//!
//! Each flow validates its input, renders a fixed prompt, performs one
//! backend call constrained by the output schema, then parses and validates
//! the structured result.

use crate::models::analysis::{
    AnalyzeLabResultsInput, AnalyzePrescriptionInput, HealthQueryAnswer, HealthQueryInput,
    LabResultsAnalysis, PrescriptionAnalysis, StructuredOutput,
};
use crate::models::data_uri::{DataUri, DataUriError};
use crate::services::metrics;
use crate::services::prompts;
use crate::services::providers::{GenerationParams, MediaPart, ProviderError, TextProvider};
use async_trait::async_trait;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use validator::{Validate, ValidationErrors};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationErrors),

    #[error("invalid document: {0}")]
    InvalidDocument(#[from] DataUriError),

    #[error("backend call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("backend returned no output")]
    EmptyOutput,

    #[error("output does not match schema: {0}")]
    SchemaViolation(String),
}

impl FlowError {
    fn outcome(&self) -> &'static str {
        match self {
            FlowError::InvalidInput(_) | FlowError::InvalidDocument(_) => "invalid_input",
            FlowError::Provider(_) => "provider_error",
            FlowError::EmptyOutput => "empty_output",
            FlowError::SchemaViolation(_) => "schema_violation",
        }
    }
}

impl From<FlowError> for AppError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::InvalidInput(errors) => AppError::ValidationError(errors),
            FlowError::InvalidDocument(e) => AppError::BadRequest(anyhow::Error::new(e)),
            FlowError::Provider(ProviderError::NotConfigured(_)) => AppError::ServiceUnavailable,
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

/// The three prompt-backed capabilities.
#[async_trait]
pub trait AnalysisFlows: Send + Sync {
    async fn analyze_prescription(
        &self,
        input: AnalyzePrescriptionInput,
    ) -> Result<PrescriptionAnalysis, FlowError>;

    async fn analyze_lab_results(
        &self,
        input: AnalyzeLabResultsInput,
    ) -> Result<LabResultsAnalysis, FlowError>;

    async fn answer_health_query(
        &self,
        input: HealthQueryInput,
    ) -> Result<HealthQueryAnswer, FlowError>;
}

/// Flows executed against a [`TextProvider`].
pub struct PromptFlows {
    provider: Arc<dyn TextProvider>,
}

impl PromptFlows {
    pub fn new(provider: Arc<dyn TextProvider>) -> Self {
        Self { provider }
    }

    async fn run<O: StructuredOutput>(
        &self,
        flow: &'static str,
        prompt: &str,
        media: &[MediaPart],
    ) -> Result<O, FlowError> {
        let start = Instant::now();
        let params = GenerationParams {
            output_schema: Some(O::output_schema()),
        };

        let result = match self.provider.generate(prompt, media, &params).await {
            Ok(response) => {
                tracing::debug!(
                    flow,
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    finish_reason = ?response.finish_reason,
                    "Backend responded"
                );
                response
                    .text
                    .ok_or(FlowError::EmptyOutput)
                    .and_then(|text| parse_structured::<O>(&text))
            }
            Err(e) => {
                metrics::record_provider_error(self.provider.name(), e.kind());
                Err(FlowError::Provider(e))
            }
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => {
                tracing::warn!(flow, error = %e, "Flow failed");
                e.outcome()
            }
        };
        metrics::record_relay(flow, outcome, start.elapsed().as_secs_f64());

        result
    }
}

#[async_trait]
impl AnalysisFlows for PromptFlows {
    #[tracing::instrument(skip_all)]
    async fn analyze_prescription(
        &self,
        input: AnalyzePrescriptionInput,
    ) -> Result<PrescriptionAnalysis, FlowError> {
        input.validate()?;
        let document: DataUri = input.photo_data_uri.parse()?;

        self.run(
            "prescription",
            prompts::PRESCRIPTION_PROMPT,
            &[MediaPart::from(&document)],
        )
        .await
    }

    #[tracing::instrument(skip_all)]
    async fn analyze_lab_results(
        &self,
        input: AnalyzeLabResultsInput,
    ) -> Result<LabResultsAnalysis, FlowError> {
        input.validate()?;
        let document: DataUri = input.file_data_uri.parse()?;

        self.run(
            "lab",
            prompts::LAB_RESULTS_PROMPT,
            &[MediaPart::from(&document)],
        )
        .await
    }

    #[tracing::instrument(skip_all)]
    async fn answer_health_query(
        &self,
        input: HealthQueryInput,
    ) -> Result<HealthQueryAnswer, FlowError> {
        input.validate()?;
        let prompt = prompts::health_query_prompt(&input.query);

        self.run("health_query", &prompt, &[]).await
    }
}

/// Parse backend text into `O`, tolerating a surrounding markdown code fence.
pub fn parse_structured<O: StructuredOutput>(text: &str) -> Result<O, FlowError> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return Err(FlowError::EmptyOutput);
    }

    let output: O =
        serde_json::from_str(body).map_err(|e| FlowError::SchemaViolation(e.to_string()))?;
    output
        .validate()
        .map_err(|e| FlowError::SchemaViolation(e.to_string()))?;

    Ok(output)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::mock::{MockBehavior, MockTextProvider};

    const PNG_URI: &str = "data:image/png;base64,aGVsbG8=";

    fn flows(behavior: MockBehavior) -> (Arc<MockTextProvider>, PromptFlows) {
        let provider = Arc::new(MockTextProvider::new(behavior));
        (provider.clone(), PromptFlows::new(provider))
    }

    #[tokio::test]
    async fn prescription_returns_all_three_fields() {
        let (_, flows) = flows(MockBehavior::SchemaFill);
        let output = flows
            .analyze_prescription(AnalyzePrescriptionInput {
                photo_data_uri: PNG_URI.to_string(),
            })
            .await
            .unwrap();

        assert!(!output.analysis.is_empty());
        assert!(!output.exercises.is_empty());
        assert!(!output.home_remedies.is_empty());
    }

    #[tokio::test]
    async fn invalid_document_never_reaches_backend() {
        let (provider, flows) = flows(MockBehavior::SchemaFill);
        let err = flows
            .analyze_lab_results(AnalyzeLabResultsInput {
                file_data_uri: "https://example.com/x.png".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::InvalidInput(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn missing_field_is_schema_violation() {
        let (_, flows) = flows(MockBehavior::Respond(r#"{"analysis":"a"}"#.into()));
        let err = flows
            .analyze_prescription(AnalyzePrescriptionInput {
                photo_data_uri: PNG_URI.to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::SchemaViolation(_)));
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let (_, flows) = flows(MockBehavior::Fail("quota".into()));
        let err = flows
            .answer_health_query(HealthQueryInput {
                query: "Is ibuprofen safe?".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::Provider(_)));
        let app: AppError = err.into();
        assert_eq!(app.status_code(), axum::http::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let (provider, flows) = flows(MockBehavior::SchemaFill);
        let err = flows
            .answer_health_query(HealthQueryInput { query: "  ".into() })
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::InvalidInput(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn fenced_json_is_accepted() {
        let output: LabResultsAnalysis =
            parse_structured("```json\n{\"summary\": \"All normal\"}\n```").unwrap();
        assert_eq!(output.summary, "All normal");
    }

    #[test]
    fn empty_text_is_empty_output() {
        let err = parse_structured::<LabResultsAnalysis>("   ").unwrap_err();
        assert!(matches!(err, FlowError::EmptyOutput));
    }
}
