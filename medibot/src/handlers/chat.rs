use crate::handlers::is_htmx;
use crate::models::analysis::validate_not_blank;
use crate::models::chat::{ChatMessage, ChatState};
use crate::models::notice::Notice;
use crate::models::visitor::Visitor;
use crate::services::sessions::PendingReply;
use crate::AppState;
use askama::Template;
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

#[derive(Template)]
#[template(path = "chat.html")]
pub struct ChatTemplate {
    pub messages: Vec<ChatMessage>,
    pub busy: bool,
    pub notice: Option<Notice>,
}

#[derive(Template)]
#[template(path = "partials/transcript.html")]
pub struct TranscriptTemplate {
    pub messages: Vec<ChatMessage>,
    pub busy: bool,
    pub notice: Option<Notice>,
}

impl TranscriptTemplate {
    fn snapshot(visitor: &Visitor, notice: Option<Notice>) -> Self {
        let state = visitor.session.lock();
        Self {
            messages: state.conversation.messages().to_vec(),
            busy: state.conversation.is_busy(),
            notice,
        }
    }
}

impl From<TranscriptTemplate> for ChatTemplate {
    fn from(t: TranscriptTemplate) -> Self {
        Self {
            messages: t.messages,
            busy: t.busy,
            notice: t.notice,
        }
    }
}

#[derive(Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub state: ChatState,
    pub messages: Vec<ChatMessage>,
}

pub async fn chat_page(visitor: Visitor) -> impl IntoResponse {
    ChatTemplate::from(TranscriptTemplate::snapshot(&visitor, None))
}

/// Run the relay for a started turn. The call lives in its own task so the
/// reply lands in the conversation even if the browser goes away.
async fn settle_turn(state: &AppState, pending: PendingReply) -> Option<Notice> {
    let relay = state.chat_relay.clone();
    let task = tokio::spawn(async move {
        let reply = relay.send_message(pending.message()).await;
        pending.complete(reply);
    });

    match task.await {
        Ok(()) => None,
        Err(e) => {
            tracing::error!(error = %e, "Chat relay task failed");
            Some(Notice::chat_failed())
        }
    }
}

pub async fn submit_chat(
    State(state): State<AppState>,
    visitor: Visitor,
    headers: HeaderMap,
    Form(form): Form<ChatForm>,
) -> Response {
    let notice = match visitor.session.begin_turn(&form.message) {
        Ok(pending) => settle_turn(&state, pending).await,
        Err(rejection) => {
            tracing::debug!(
                conversation_id = %visitor.conversation_id,
                reason = %rejection,
                "Ignored chat submit"
            );
            None
        }
    };

    let transcript = TranscriptTemplate::snapshot(&visitor, notice);
    if is_htmx(&headers) {
        return transcript.into_response();
    }

    if transcript.notice.is_some() {
        ChatTemplate::from(transcript).into_response()
    } else {
        Redirect::to("/").into_response()
    }
}

/// Transcript fragment, polled while a reply is pending.
pub async fn transcript(visitor: Visitor) -> impl IntoResponse {
    TranscriptTemplate::snapshot(&visitor, None)
}

/// Stateless relay: one message in, one reply out.
pub async fn api_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    request.validate()?;
    let reply = state.chat_relay.send_message(&request.message).await;
    Ok(Json(ChatResponse { reply }))
}

pub async fn api_transcript(visitor: Visitor) -> Json<TranscriptResponse> {
    let state = visitor.session.lock();
    Json(TranscriptResponse {
        state: state.conversation.state(),
        messages: state.conversation.messages().to_vec(),
    })
}
