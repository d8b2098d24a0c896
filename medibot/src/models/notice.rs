use super::analysis::AnalysisKind;
use serde::Serialize;

/// A dismissible notification rendered next to a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: &'static str,
    pub description: &'static str,
}

impl Notice {
    pub fn chat_failed() -> Self {
        Self {
            title: "Error",
            description: "Something went wrong. Please check your connection and try again.",
        }
    }

    pub fn no_file(kind: AnalysisKind) -> Self {
        Self {
            title: "No file selected",
            description: kind.missing_file_message(),
        }
    }

    pub fn analysis_failed(kind: AnalysisKind) -> Self {
        Self {
            title: "Analysis Failed",
            description: kind.failure_message(),
        }
    }
}
