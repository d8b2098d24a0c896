//! `data:<mimetype>;base64,<payload>` documents.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DataUriError {
    #[error("missing 'data:' scheme")]
    MissingScheme,

    #[error("payload must be base64 encoded")]
    NotBase64,

    #[error("invalid MIME type '{0}'")]
    InvalidMimeType(String),

    #[error("empty payload")]
    EmptyPayload,

    #[error("malformed base64 payload")]
    MalformedPayload,
}

/// A self-describing document: MIME type plus base64 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    mime_type: String,
    data: String,
}

impl DataUri {
    /// Encode raw bytes with their MIME type.
    pub fn encode(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_ascii_lowercase(),
            data: STANDARD.encode(bytes),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The base64 payload, as sent to the execution backend.
    pub fn base64_data(&self) -> &str {
        &self.data
    }

    /// Decode the payload back to raw bytes.
    pub fn decode_bytes(&self) -> Result<Vec<u8>, DataUriError> {
        STANDARD
            .decode(&self.data)
            .map_err(|_| DataUriError::MalformedPayload)
    }
}

impl FromStr for DataUri {
    type Err = DataUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.trim().strip_prefix(SCHEME).ok_or(DataUriError::MissingScheme)?;
        let (meta, payload) = rest
            .split_once(BASE64_MARKER)
            .ok_or(DataUriError::NotBase64)?;

        // Parameters such as `;charset=` may precede the base64 marker.
        let mime_type = meta.split(';').next().unwrap_or_default().trim();
        match mime_type.split_once('/') {
            Some((kind, subtype)) if !kind.is_empty() && !subtype.is_empty() => {}
            _ => return Err(DataUriError::InvalidMimeType(mime_type.to_string())),
        }

        if payload.is_empty() {
            return Err(DataUriError::EmptyPayload);
        }
        let uri = Self {
            mime_type: mime_type.to_ascii_lowercase(),
            data: payload.to_string(),
        };
        uri.decode_bytes()?;

        Ok(uri)
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}{}", SCHEME, self.mime_type, BASE64_MARKER, self.data)
    }
}
