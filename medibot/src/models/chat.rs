//! Chat transcript and its submit/resolve state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Content of the bot bubble while a reply is pending.
pub const TYPING_PLACEHOLDER: &str = "...";

pub const GREETING_ID: &str = "init";

pub const GREETING: &str =
    "Hello! I'm MediBot, your intelligent health assistant. How can I help you today?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_bot(&self) -> bool {
        self.role == Role::Bot
    }

    pub fn is_typing(&self) -> bool {
        self.is_bot() && self.content == TYPING_PLACEHOLDER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatState {
    Idle,
    AwaitingResponse,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    #[error("message is blank")]
    Blank,

    #[error("a reply is still pending")]
    Busy,
}

/// A submitted turn whose bot reply has not arrived yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub placeholder_id: String,
    pub message: String,
}

/// In-memory session history. Append-only, at most one pending reply.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    pending: Option<String>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// A fresh conversation opened by the bot greeting.
    pub fn new() -> Self {
        let greeting = ChatMessage {
            id: GREETING_ID.to_string(),
            role: Role::Bot,
            content: GREETING.to_string(),
            timestamp: Utc::now(),
        };

        Self {
            messages: vec![greeting],
            pending: None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn state(&self) -> ChatState {
        if self.pending.is_some() {
            ChatState::AwaitingResponse
        } else {
            ChatState::Idle
        }
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Append the user message and the bot placeholder together.
    pub fn begin_submit(&mut self, input: &str) -> Result<Turn, SubmitRejection> {
        if input.trim().is_empty() {
            return Err(SubmitRejection::Blank);
        }
        if self.is_busy() {
            return Err(SubmitRejection::Busy);
        }

        let user = ChatMessage::new(Role::User, input);
        let placeholder = ChatMessage::new(Role::Bot, TYPING_PLACEHOLDER);
        let turn = Turn {
            placeholder_id: placeholder.id.clone(),
            message: input.to_string(),
        };

        self.messages.extend([user, placeholder]);
        self.pending = Some(turn.placeholder_id.clone());
        Ok(turn)
    }

    /// Replace the placeholder content in place. Returns false for a stale id.
    pub fn resolve(&mut self, placeholder_id: &str, reply: String) -> bool {
        if self.pending.as_deref() != Some(placeholder_id) {
            return false;
        }

        match self.messages.iter_mut().find(|m| m.id == placeholder_id) {
            Some(message) => {
                message.content = reply;
                self.pending = None;
                true
            }
            None => {
                self.pending = None;
                false
            }
        }
    }

    /// Drop the placeholder after a failed relay.
    pub fn abandon(&mut self, placeholder_id: &str) -> bool {
        if self.pending.as_deref() != Some(placeholder_id) {
            return false;
        }

        self.messages.retain(|m| m.id != placeholder_id);
        self.pending = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholders(conversation: &Conversation) -> usize {
        conversation
            .messages()
            .iter()
            .filter(|m| m.is_typing())
            .count()
    }

    #[test]
    fn starts_idle_with_greeting() {
        let conversation = Conversation::new();
        assert_eq!(conversation.state(), ChatState::Idle);
        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.messages()[0].id, GREETING_ID);
        assert!(conversation.messages()[0].is_bot());
    }

    #[test]
    fn whitespace_submit_leaves_history_unchanged() {
        let mut conversation = Conversation::new();
        assert_eq!(
            conversation.begin_submit("   \n\t"),
            Err(SubmitRejection::Blank)
        );
        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.state(), ChatState::Idle);
    }

    #[test]
    fn submit_appends_user_message_and_placeholder() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_submit("I have a headache").unwrap();

        let messages = conversation.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "I have a headache");
        assert_eq!(messages[2].id, turn.placeholder_id);
        assert!(messages[2].is_typing());
        assert_eq!(conversation.state(), ChatState::AwaitingResponse);
    }

    #[test]
    fn second_submit_while_pending_is_rejected() {
        let mut conversation = Conversation::new();
        conversation.begin_submit("first").unwrap();

        assert_eq!(
            conversation.begin_submit("second"),
            Err(SubmitRejection::Busy)
        );
        assert_eq!(conversation.messages().len(), 3);
        assert_eq!(placeholders(&conversation), 1);
    }

    #[test]
    fn resolve_replaces_placeholder_in_place() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_submit("hi").unwrap();

        assert!(conversation.resolve(&turn.placeholder_id, "Hello there".to_string()));

        let reply = &conversation.messages()[2];
        assert_eq!(reply.id, turn.placeholder_id);
        assert_eq!(reply.content, "Hello there");
        assert_eq!(conversation.state(), ChatState::Idle);
    }

    #[test]
    fn abandon_removes_placeholder() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_submit("hi").unwrap();

        assert!(conversation.abandon(&turn.placeholder_id));
        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(placeholders(&conversation), 0);
        assert_eq!(conversation.state(), ChatState::Idle);

        // Idle again, so the next submit goes through.
        assert!(conversation.begin_submit("again").is_ok());
    }

    #[test]
    fn stale_placeholder_ids_are_ignored() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_submit("hi").unwrap();
        conversation.resolve(&turn.placeholder_id, "done".to_string());

        assert!(!conversation.resolve(&turn.placeholder_id, "again".to_string()));
        assert!(!conversation.abandon(&turn.placeholder_id));
        assert_eq!(conversation.messages()[2].content, "done");
    }
}
