pub mod analysis;
pub mod app;
pub mod chat;

use askama::Template;
use axum::http::HeaderMap;
use service_core::error::AppError;

/// Header htmx sets on every request it issues.
pub const HX_REQUEST: &str = "hx-request";

/// True when the request came from htmx and wants a fragment back.
pub fn is_htmx(headers: &HeaderMap) -> bool {
    headers
        .get(HX_REQUEST)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Render a template to a string for embedding in another template.
pub(crate) fn render_fragment<T: Template>(template: &T) -> Result<String, AppError> {
    template.render().map_err(|e| {
        tracing::error!(error = %e, "Failed to render template");
        AppError::InternalError(anyhow::Error::new(e))
    })
}
