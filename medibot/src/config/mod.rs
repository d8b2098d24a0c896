use secrecy::Secret;
use serde::Deserialize;
use service_core::config::{configuration_directory, load_settings};
use service_core::error::AppError;

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub server: ServerSettings,
    pub webhook: WebhookSettings,
    pub genai: GenaiSettings,
    #[serde(default)]
    pub uploads: UploadSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Idle conversations are dropped after this many minutes.
    #[serde(default = "default_session_idle_minutes")]
    pub session_idle_minutes: u64,
}

fn default_session_idle_minutes() -> u64 {
    60
}

#[derive(Deserialize, Clone, Debug)]
pub struct WebhookSettings {
    /// Chat webhook endpoint. Deployment-specific, never compiled in.
    #[serde(default)]
    pub url: String,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    Mock,
}

#[derive(Deserialize, Clone, Debug)]
pub struct GenaiSettings {
    pub provider: ProviderKind,
    /// Required when `provider` is `gemini`.
    #[serde(default)]
    pub api_key: Option<Secret<String>>,
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

#[derive(Deserialize, Clone, Debug)]
pub struct UploadSettings {
    pub max_bytes: usize,
    /// Reject uploads outside the PNG/JPEG/PDF list advertised by the forms.
    pub enforce_accepted_types: bool,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            enforce_accepted_types: true,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            otlp_endpoint: None,
        }
    }
}

pub fn get_configuration() -> Result<Settings, AppError> {
    let directory = configuration_directory("medibot")?;
    let settings: Settings = load_settings(&directory)?;
    settings.validate()?;
    Ok(settings)
}

impl Settings {
    /// Cross-field checks serde cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.webhook.url.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "webhook.url is required (set APP_WEBHOOK__URL)"
            )));
        }

        if self.genai.provider == ProviderKind::Gemini && self.genai.api_key.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "genai.api_key is required for the gemini provider (set APP_GENAI__API_KEY)"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: ProviderKind, api_key: Option<&str>, url: &str) -> Settings {
        Settings {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 0,
                session_idle_minutes: 60,
            },
            webhook: WebhookSettings {
                url: url.to_string(),
            },
            genai: GenaiSettings {
                provider,
                api_key: api_key.map(|k| Secret::new(k.to_string())),
                model: "gemini-2.0-flash".to_string(),
                api_base: default_api_base(),
                timeout_seconds: 120,
            },
            uploads: UploadSettings::default(),
            telemetry: TelemetrySettings::default(),
        }
    }

    #[test]
    fn gemini_requires_api_key() {
        let s = settings(ProviderKind::Gemini, None, "http://hook");
        assert!(s.validate().is_err());

        let s = settings(ProviderKind::Gemini, Some("key"), "http://hook");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn mock_provider_needs_no_key() {
        let s = settings(ProviderKind::Mock, None, "http://hook");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn webhook_url_must_be_set() {
        let s = settings(ProviderKind::Mock, None, "  ");
        assert!(s.validate().is_err());
    }
}
