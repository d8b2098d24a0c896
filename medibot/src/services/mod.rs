pub mod chat_relay;
pub mod cookie_store;
pub mod flows;
pub mod metrics;
pub mod prompts;
pub mod providers;
pub mod sessions;
pub mod upload;
