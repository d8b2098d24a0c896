//! Reading an uploaded file from a multipart form into a data URI.

use crate::config::UploadSettings;
use crate::models::data_uri::DataUri;
use axum::extract::multipart::{Field, Multipart, MultipartError};
use thiserror::Error;

/// Types the analysis forms accept.
pub const ACCEPTED_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/jpg", "application/pdf"];

/// Value for the file inputs' `accept` attribute.
pub const ACCEPT_ATTRIBUTE: &str = "image/png,image/jpeg,image/jpg,application/pdf";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no file was selected")]
    Missing,

    #[error("failed to read upload: {0}")]
    Read(#[from] MultipartError),

    #[error("unsupported file type '{0}'")]
    UnsupportedType(String),

    #[error("file is larger than {limit} bytes")]
    TooLarge { limit: usize },
}

/// Read the named file field and encode it as a data URI.
///
/// Browsers submit an empty part when no file is chosen; that counts as
/// [`UploadError::Missing`].
pub async fn read_data_uri(
    multipart: &mut Multipart,
    field_name: &str,
    settings: &UploadSettings,
) -> Result<DataUri, UploadError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(field_name) {
            continue;
        }

        let mime_type = resolve_mime_type(&field);
        let bytes = field.bytes().await?;

        if bytes.is_empty() {
            return Err(UploadError::Missing);
        }
        if bytes.len() > settings.max_bytes {
            return Err(UploadError::TooLarge {
                limit: settings.max_bytes,
            });
        }
        if settings.enforce_accepted_types && !ACCEPTED_TYPES.contains(&mime_type.as_str()) {
            return Err(UploadError::UnsupportedType(mime_type));
        }

        tracing::debug!(mime_type = %mime_type, size = bytes.len(), "Encoded upload");
        return Ok(DataUri::encode(&mime_type, &bytes));
    }

    Err(UploadError::Missing)
}

fn resolve_mime_type(field: &Field<'_>) -> String {
    let declared = field
        .content_type()
        .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");

    declared
        .or_else(|| field.file_name().and_then(mime_from_extension).map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

fn mime_from_extension(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}
