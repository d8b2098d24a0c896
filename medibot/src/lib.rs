pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

use axum::extract::FromRef;
use config::Settings;
use services::{
    chat_relay::ChatRelay, cookie_store::ExpiringMemoryStore, flows::AnalysisFlows,
    providers::TextProvider, sessions::SessionStore,
};
use std::sync::Arc;

/// Shared application state: relays, the execution backend and live sessions.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub chat_relay: Arc<dyn ChatRelay>,
    pub flows: Arc<dyn AnalysisFlows>,
    pub provider: Arc<dyn TextProvider>,
    pub sessions: SessionStore,
    pub session_records: ExpiringMemoryStore,
}

impl FromRef<AppState> for SessionStore {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
