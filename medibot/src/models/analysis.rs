//! Input and output schemas for the document-analysis and health-query flows.

use super::data_uri::DataUri;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use validator::{Validate, ValidationError};

/// The two upload forms on the analysis page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Prescription,
    Lab,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Prescription => "prescription",
            AnalysisKind::Lab => "lab",
        }
    }

    /// Description shown when the form is submitted without a file.
    pub fn missing_file_message(&self) -> &'static str {
        match self {
            AnalysisKind::Prescription => {
                "Please select an image or PDF of your prescription."
            }
            AnalysisKind::Lab => "Please select a file with your lab results.",
        }
    }

    /// Description shown when the analysis call fails.
    pub fn failure_message(&self) -> &'static str {
        match self {
            AnalysisKind::Prescription => "Could not analyze the prescription. Please try again.",
            AnalysisKind::Lab => "Could not analyze the lab results. Please try again.",
        }
    }
}

/// Checks the `data:<mimetype>;base64,<data>` shape.
pub fn validate_data_uri(value: &str) -> Result<(), ValidationError> {
    value.parse::<DataUri>().map(|_| ()).map_err(|e| {
        let mut err = ValidationError::new("data_uri");
        err.message = Some(Cow::Owned(format!(
            "expected 'data:<mimetype>;base64,<encoded_data>': {}",
            e
        )));
        err
    })
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some(Cow::Borrowed("must not be blank"));
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzePrescriptionInput {
    /// Photo or scan of a prescription.
    #[validate(custom(function = "validate_data_uri"))]
    pub photo_data_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionAnalysis {
    #[validate(custom(function = "validate_not_blank"))]
    pub analysis: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub exercises: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub home_remedies: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeLabResultsInput {
    /// Lab results as an image or PDF.
    #[validate(custom(function = "validate_data_uri"))]
    pub file_data_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct LabResultsAnalysis {
    #[validate(custom(function = "validate_not_blank"))]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HealthQueryInput {
    #[validate(custom(function = "validate_not_blank"))]
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct HealthQueryAnswer {
    #[validate(custom(function = "validate_not_blank"))]
    pub response: String,
}

/// A flow result the execution backend must produce as JSON.
pub trait StructuredOutput: DeserializeOwned + Validate + Send {
    /// `(field, description)` pairs; every field is a required string.
    const FIELDS: &'static [(&'static str, &'static str)];

    /// Response schema in the backend's OpenAPI-subset dialect.
    fn output_schema() -> Value {
        string_object_schema(Self::FIELDS)
    }
}

impl StructuredOutput for PrescriptionAnalysis {
    const FIELDS: &'static [(&'static str, &'static str)] = &[
        (
            "analysis",
            "A detailed analysis of the prescription, including the purpose of the medications.",
        ),
        (
            "exercises",
            "A list of suggested gentle exercises that may help with the underlying condition. This should not be medical advice.",
        ),
        (
            "homeRemedies",
            "A list of suggested home remedies that could complement the treatment. This should not be medical advice and should not include taking any other medicine.",
        ),
    ];
}

impl StructuredOutput for LabResultsAnalysis {
    const FIELDS: &'static [(&'static str, &'static str)] = &[(
        "summary",
        "A summary of the lab results, including which values are outside of the normal range and what they could indicate.",
    )];
}

impl StructuredOutput for HealthQueryAnswer {
    const FIELDS: &'static [(&'static str, &'static str)] =
        &[("response", "The response to the user health query.")];
}

fn string_object_schema(fields: &[(&str, &str)]) -> Value {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|(name, description)| {
            (
                name.to_string(),
                json!({ "type": "STRING", "description": description }),
            )
        })
        .collect();
    let required: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();

    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": required,
    })
}
