use crate::services::sessions::{SessionStore, SharedSession};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use tower_sessions::Session;
use uuid::Uuid;

const CONVERSATION_KEY: &str = "conversation_id";

/// The browser session's conversation, created on first visit.
#[derive(Debug, Clone)]
pub struct Visitor {
    pub conversation_id: String,
    pub session: SharedSession,
}

#[async_trait]
impl<S> FromRequestParts<S> for Visitor
where
    SessionStore: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to extract session",
                )
                    .into_response()
            })?;

        let existing: Option<String> = session.get(CONVERSATION_KEY).await.unwrap_or(None);
        let conversation_id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                session
                    .insert(CONVERSATION_KEY, &id)
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "Failed to store conversation id");
                        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start session")
                            .into_response()
                    })?;
                tracing::debug!(conversation_id = %id, "Started new conversation");
                id
            }
        };

        let store = SessionStore::from_ref(state);
        let session = store.get_or_create(&conversation_id);

        Ok(Visitor {
            conversation_id,
            session,
        })
    }
}
