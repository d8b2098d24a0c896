//! Application startup and lifecycle management.

use crate::config::{ProviderKind, Settings};
use crate::handlers::{
    analysis::{
        analysis_page, api_analyze_lab, api_analyze_prescription, api_health_query, submit_lab,
        submit_prescription,
    },
    app::{health_check, metrics, readiness_check},
    chat::{api_chat, api_transcript, chat_page, submit_chat, transcript},
};
use crate::middleware::metrics::metrics_middleware;
use crate::services::chat_relay::{ChatRelay, WebhookChatRelay};
use crate::services::cookie_store::ExpiringMemoryStore;
use crate::services::flows::{AnalysisFlows, PromptFlows};
use crate::services::providers::gemini::{GeminiConfig, GeminiTextProvider};
use crate::services::providers::mock::MockTextProvider;
use crate::services::providers::TextProvider;
use crate::services::sessions::SessionStore;
use crate::AppState;
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, SessionManagerLayer};

const SESSION_COOKIE: &str = "medibot.sid";

/// Headroom over the upload limit for multipart framing and base64 growth.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the execution backend selected in configuration.
pub fn build_provider(settings: &Settings) -> Result<Arc<dyn TextProvider>, AppError> {
    match settings.genai.provider {
        ProviderKind::Gemini => {
            let api_key = settings.genai.api_key.clone().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("genai.api_key is not set"))
            })?;

            let provider = GeminiTextProvider::new(GeminiConfig {
                api_key,
                model: settings.genai.model.clone(),
                api_base: settings.genai.api_base.clone(),
                timeout: Duration::from_secs(settings.genai.timeout_seconds),
            })
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

            tracing::info!(model = %settings.genai.model, "Initialized Gemini text provider");
            Ok(Arc::new(provider))
        }
        ProviderKind::Mock => {
            tracing::warn!("Using mock text provider; analysis results are placeholders");
            Ok(Arc::new(MockTextProvider::default()))
        }
    }
}

/// Wire relays, flows and the session store from configuration.
pub fn build_state(settings: Settings) -> Result<AppState, AppError> {
    // The webhook call has no client-side timeout.
    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;
    let chat_relay: Arc<dyn ChatRelay> =
        Arc::new(WebhookChatRelay::new(client, settings.webhook.url.clone()));

    let provider = build_provider(&settings)?;
    let flows: Arc<dyn AnalysisFlows> = Arc::new(PromptFlows::new(provider.clone()));

    Ok(AppState {
        sessions: session_store(&settings),
        session_records: ExpiringMemoryStore::default(),
        settings: Arc::new(settings),
        chat_relay,
        flows,
        provider,
    })
}

pub fn session_store(settings: &Settings) -> SessionStore {
    SessionStore::new(Duration::from_secs(
        settings.server.session_idle_minutes * 60,
    ))
}

pub fn build_router(state: AppState) -> Router {
    let idle_minutes = i64::try_from(state.settings.server.session_idle_minutes).unwrap_or(i64::MAX);
    let session_layer = SessionManagerLayer::new(state.session_records.clone())
        .with_name(SESSION_COOKIE)
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(idle_minutes)));

    // Base64 inflates documents by a third on the JSON API.
    let body_limit = state.settings.uploads.max_bytes / 3 * 4 + BODY_OVERHEAD_BYTES;

    Router::new()
        .route("/", get(chat_page))
        .route("/chat", post(submit_chat))
        .route("/chat/messages", get(transcript))
        .route("/analysis", get(analysis_page))
        .route("/analysis/prescription", post(submit_prescription))
        .route("/analysis/lab", post(submit_lab))
        .route("/api/chat", post(api_chat))
        .route("/api/chat/messages", get(api_transcript))
        .route("/api/analysis/prescription", post(api_analyze_prescription))
        .route("/api/analysis/lab", post(api_analyze_lab))
        .route("/api/health-query", post(api_health_query))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .route_layer(from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(session_layer)
        .layer(from_fn(security_headers_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    sessions: SessionStore,
    session_records: ExpiringMemoryStore,
}

impl Application {
    /// Build the application from configuration.
    pub async fn build(settings: Settings) -> Result<Self, AppError> {
        let state = build_state(settings)?;
        Self::with_state(state).await
    }

    /// Build the application around pre-wired state (port 0 = random port).
    pub async fn with_state(state: AppState) -> Result<Self, AppError> {
        let address = format!(
            "{}:{}",
            state.settings.server.host, state.settings.server.port
        );
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        let sessions = state.sessions.clone();
        let session_records = state.session_records.clone();
        let router = build_router(state);

        Ok(Self {
            port,
            listener,
            router,
            sessions,
            session_records,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until SIGINT/SIGTERM, sweeping idle sessions in the background.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let sweeper = self.sessions.spawn_sweeper();
        let record_sweeper = self
            .session_records
            .spawn_expiry_sweeper(self.sessions.sweep_period());

        tracing::info!(port = self.port, "Starting medibot");
        let result = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        sweeper.abort();
        record_sweeper.abort();
        result.map_err(|e| {
            tracing::error!("Server error: {}", e);
            e
        })
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        GenaiSettings, ServerSettings, TelemetrySettings, UploadSettings, WebhookSettings,
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn settings() -> Settings {
        Settings {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 0,
                session_idle_minutes: 30,
            },
            webhook: WebhookSettings {
                url: "http://127.0.0.1:1/webhook".to_string(),
            },
            genai: GenaiSettings {
                provider: ProviderKind::Mock,
                api_key: None,
                model: "mock".to_string(),
                api_base: "http://127.0.0.1:1".to_string(),
                timeout_seconds: 5,
            },
            uploads: UploadSettings::default(),
            telemetry: TelemetrySettings::default(),
        }
    }

    #[tokio::test]
    async fn health_route_is_wired() {
        let router = build_router(build_state(settings()).unwrap());

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn chat_page_starts_a_session() {
        let state = build_state(settings()).unwrap();
        let sessions = state.sessions.clone();
        let records = state.session_records.clone();
        let router = build_router(state);

        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("set-cookie"));
        assert_eq!(sessions.len(), 1);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn gemini_without_key_is_a_config_error() {
        let mut settings = settings();
        settings.genai.provider = ProviderKind::Gemini;
        assert!(build_provider(&settings).is_err());
    }
}
