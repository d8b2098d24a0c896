#![allow(dead_code)]

use medibot::config::{
    GenaiSettings, ProviderKind, ServerSettings, Settings, TelemetrySettings, UploadSettings,
    WebhookSettings,
};
use medibot::services::flows::PromptFlows;
use medibot::services::providers::mock::{MockBehavior, MockTextProvider};
use medibot::services::providers::TextProvider;
use medibot::startup::{build_state, Application};
use reqwest::redirect::Policy;
use std::sync::Arc;
use wiremock::MockServer;

pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub struct TestApp {
    pub address: String,
    pub port: u16,
    /// Stands in for the chat webhook.
    pub webhook: MockServer,
    pub provider: Arc<MockTextProvider>,
    /// Keeps the session cookie between requests; never follows redirects.
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(MockTextProvider::default()).await
    }

    pub async fn spawn_with(provider: MockTextProvider) -> Self {
        let webhook = MockServer::start().await;

        let settings = Settings {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 0, // Random port
                session_idle_minutes: 60,
            },
            webhook: WebhookSettings {
                url: format!("{}/webhook", webhook.uri()),
            },
            genai: GenaiSettings {
                provider: ProviderKind::Mock,
                api_key: None,
                model: "mock".to_string(),
                api_base: "http://127.0.0.1:1".to_string(),
                timeout_seconds: 5,
            },
            uploads: UploadSettings {
                max_bytes: 1024 * 1024,
                enforce_accepted_types: true,
            },
            telemetry: TelemetrySettings::default(),
        };

        let provider = Arc::new(provider);
        let mut state = build_state(settings).expect("Failed to build test state");
        state.provider = provider.clone() as Arc<dyn TextProvider>;
        state.flows = Arc::new(PromptFlows::new(provider.clone()));

        let app = Application::with_state(state)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .build()
            .expect("Failed to build test client");

        // Wait for the server to accept connections
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            webhook,
            provider,
            client,
        }
    }

    pub fn failing(message: &str) -> MockTextProvider {
        MockTextProvider::new(MockBehavior::Fail(message.to_string()))
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Open the chat page so the client holds a session cookie.
    pub async fn open_session(&self) {
        let response = self
            .client
            .get(self.url("/"))
            .send()
            .await
            .expect("Failed to load chat page");
        assert!(response.status().is_success());
    }

    pub async fn post_chat(&self, message: &str, htmx: bool) -> reqwest::Response {
        let mut request = self
            .client
            .post(self.url("/chat"))
            .form(&[("message", message)]);
        if htmx {
            request = request.header("HX-Request", "true");
        }
        request.send().await.expect("Failed to submit chat")
    }

    pub async fn transcript(&self) -> serde_json::Value {
        self.client
            .get(self.url("/api/chat/messages"))
            .send()
            .await
            .expect("Failed to fetch transcript")
            .json()
            .await
            .expect("Transcript is not JSON")
    }

    pub async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        file_name: &str,
        mime: &str,
    ) -> reqwest::Response {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime)
            .expect("Invalid MIME type");
        let form = reqwest::multipart::Form::new().part("file", part);

        self.client
            .post(self.url(path))
            .header("HX-Request", "true")
            .multipart(form)
            .send()
            .await
            .expect("Failed to upload")
    }
}
