use crate::handlers::{is_htmx, render_fragment};
use crate::models::analysis::{
    AnalysisKind, AnalyzeLabResultsInput, AnalyzePrescriptionInput, HealthQueryAnswer,
    HealthQueryInput, LabResultsAnalysis, PrescriptionAnalysis,
};
use crate::models::notice::Notice;
use crate::models::visitor::Visitor;
use crate::services::flows::FlowError;
use crate::services::upload::{self, UploadError, ACCEPT_ATTRIBUTE};
use crate::AppState;
use askama::Template;
use axum::{
    extract::{Multipart, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;

/// Multipart field holding the document.
const FILE_FIELD: &str = "file";

/// One titled block of a result panel.
pub struct Section {
    pub title: &'static str,
    pub body: String,
}

impl From<PrescriptionAnalysis> for Vec<Section> {
    fn from(result: PrescriptionAnalysis) -> Self {
        vec![
            Section {
                title: "Detailed Analysis",
                body: result.analysis,
            },
            Section {
                title: "Suggested Exercises",
                body: result.exercises,
            },
            Section {
                title: "Home Remedies",
                body: result.home_remedies,
            },
        ]
    }
}

impl From<LabResultsAnalysis> for Vec<Section> {
    fn from(result: LabResultsAnalysis) -> Self {
        vec![Section {
            title: "Summary",
            body: result.summary,
        }]
    }
}

/// Result area under a form: a notice, a result, or empty.
#[derive(Template)]
#[template(path = "partials/result_panel.html")]
pub struct ResultPanelTemplate {
    pub kind: &'static str,
    pub sections: Vec<Section>,
    pub notice: Option<Notice>,
}

impl ResultPanelTemplate {
    fn empty(kind: AnalysisKind) -> Self {
        Self {
            kind: kind.as_str(),
            sections: Vec::new(),
            notice: None,
        }
    }

    fn from_outcome(kind: AnalysisKind, outcome: Result<Vec<Section>, Notice>) -> Self {
        match outcome {
            Ok(sections) => Self {
                kind: kind.as_str(),
                sections,
                notice: None,
            },
            Err(notice) => Self {
                kind: kind.as_str(),
                sections: Vec::new(),
                notice: Some(notice),
            },
        }
    }
}

#[derive(Template)]
#[template(path = "analysis.html")]
pub struct AnalysisTemplate {
    pub tab: &'static str,
    pub heading: &'static str,
    pub description: &'static str,
    pub accept: &'static str,
    pub busy: bool,
    pub panel: String,
}

impl AnalysisTemplate {
    fn new(kind: AnalysisKind, busy: bool, panel: &ResultPanelTemplate) -> Result<Self, AppError> {
        let (heading, description) = match kind {
            AnalysisKind::Prescription => (
                "Prescription Analysis",
                "Upload a photo or PDF of your prescription for an explanation, gentle exercises and home remedies.",
            ),
            AnalysisKind::Lab => (
                "Lab Results Analysis",
                "Upload your lab report as an image or PDF for a summary of values outside the normal range.",
            ),
        };

        Ok(Self {
            tab: kind.as_str(),
            heading,
            description,
            accept: ACCEPT_ATTRIBUTE,
            busy,
            panel: render_fragment(panel)?,
        })
    }
}

#[derive(Deserialize)]
pub struct AnalysisQuery {
    pub tab: Option<AnalysisKind>,
}

pub async fn analysis_page(
    visitor: Visitor,
    Query(query): Query<AnalysisQuery>,
) -> Result<AnalysisTemplate, AppError> {
    let kind = query.tab.unwrap_or(AnalysisKind::Prescription);
    let busy = visitor.session.lock().is_form_busy(kind);
    AnalysisTemplate::new(kind, busy, &ResultPanelTemplate::empty(kind))
}

pub async fn submit_prescription(
    state: State<AppState>,
    visitor: Visitor,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, AppError> {
    submit_analysis(state, visitor, headers, multipart, AnalysisKind::Prescription).await
}

pub async fn submit_lab(
    state: State<AppState>,
    visitor: Visitor,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, AppError> {
    submit_analysis(state, visitor, headers, multipart, AnalysisKind::Lab).await
}

async fn submit_analysis(
    State(state): State<AppState>,
    visitor: Visitor,
    headers: HeaderMap,
    mut multipart: Multipart,
    kind: AnalysisKind,
) -> Result<Response, AppError> {
    // A call for this form is already in flight: ignore the submit.
    let Some(_guard) = visitor.session.try_begin_analysis(kind) else {
        tracing::debug!(
            conversation_id = %visitor.conversation_id,
            form = kind.as_str(),
            "Ignored analysis submit while busy"
        );
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let outcome = match upload::read_data_uri(&mut multipart, FILE_FIELD, &state.settings.uploads)
        .await
    {
        Err(UploadError::Missing) => Err(Notice::no_file(kind)),
        Err(e) => {
            tracing::warn!(form = kind.as_str(), error = %e, "Could not read upload");
            Err(Notice::analysis_failed(kind))
        }
        Ok(document) => run_flow(&state, kind, document.to_string())
            .await
            .map_err(|e| {
                tracing::error!(form = kind.as_str(), error = %e, "Analysis failed");
                Notice::analysis_failed(kind)
            }),
    };

    let panel = ResultPanelTemplate::from_outcome(kind, outcome);
    if is_htmx(&headers) {
        return Ok(panel.into_response());
    }

    Ok(AnalysisTemplate::new(kind, false, &panel)?.into_response())
}

async fn run_flow(
    state: &AppState,
    kind: AnalysisKind,
    data_uri: String,
) -> Result<Vec<Section>, FlowError> {
    match kind {
        AnalysisKind::Prescription => state
            .flows
            .analyze_prescription(AnalyzePrescriptionInput {
                photo_data_uri: data_uri,
            })
            .await
            .map(Into::into),
        AnalysisKind::Lab => state
            .flows
            .analyze_lab_results(AnalyzeLabResultsInput {
                file_data_uri: data_uri,
            })
            .await
            .map(Into::into),
    }
}

pub async fn api_analyze_prescription(
    State(state): State<AppState>,
    Json(input): Json<AnalyzePrescriptionInput>,
) -> Result<Json<PrescriptionAnalysis>, AppError> {
    Ok(Json(state.flows.analyze_prescription(input).await?))
}

pub async fn api_analyze_lab(
    State(state): State<AppState>,
    Json(input): Json<AnalyzeLabResultsInput>,
) -> Result<Json<LabResultsAnalysis>, AppError> {
    Ok(Json(state.flows.analyze_lab_results(input).await?))
}

pub async fn api_health_query(
    State(state): State<AppState>,
    Json(input): Json<HealthQueryInput>,
) -> Result<Json<HealthQueryAnswer>, AppError> {
    Ok(Json(state.flows.answer_health_query(input).await?))
}
