//! Relay chat messages to the external webhook.
//!
//! The relay never fails towards its caller: upstream errors and transport
//! failures are logged and turned into user-safe text.

use crate::services::metrics;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

/// Reply fields checked in order; the first truthy one wins.
const REPLY_FIELDS: [&str; 3] = ["reply", "message", "text"];

pub const NETWORK_FAILURE_REPLY: &str =
    "I'm sorry, but I encountered an issue while processing your request. Please try again later.";

/// User-visible text for a non-2xx webhook response.
pub fn upstream_failure_reply(status: u16) -> String {
    format!(
        "I'm sorry, the server responded with an error: {}. Please check your webhook configuration.",
        status
    )
}

#[async_trait]
pub trait ChatRelay: Send + Sync {
    /// Forward one message and return the text to show as the bot reply.
    async fn send_message(&self, message: &str) -> String;
}

#[derive(Serialize)]
struct WebhookRequest<'a> {
    message: &'a str,
}

/// Chat relay backed by an HTTP webhook.
pub struct WebhookChatRelay {
    client: Client,
    url: String,
}

impl WebhookChatRelay {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    async fn call_webhook(&self, message: &str) -> Result<(u16, String), reqwest::Error> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookRequest { message })
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl ChatRelay for WebhookChatRelay {
    #[tracing::instrument(skip_all, fields(message_len = message.len()))]
    async fn send_message(&self, message: &str) -> String {
        let start = Instant::now();

        let (outcome, reply) = match self.call_webhook(message).await {
            Ok((status, body)) if (200..300).contains(&status) => {
                tracing::debug!(status, body_len = body.len(), "Webhook replied");
                ("success", normalize_reply(&body))
            }
            Ok((status, body)) => {
                tracing::error!(status, body = %body, "Error from webhook");
                ("upstream_error", upstream_failure_reply(status))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reach chat webhook");
                ("network_error", NETWORK_FAILURE_REPLY.to_string())
            }
        };

        metrics::record_relay("chat", outcome, start.elapsed().as_secs_f64());
        reply
    }
}

/// Turn a webhook body into reply text.
///
/// JSON arrays contribute their first element. The first truthy field among
/// `reply`, `message`, `text` is returned; otherwise the value itself as
/// compact JSON. Bodies that are not JSON, or that hold no value to look
/// into (`null`, `[]`), are returned verbatim.
pub fn normalize_reply(body: &str) -> String {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return body.to_string(),
    };

    let data = match parsed {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        Value::Array(_) => Value::Null,
        other => other,
    };

    // Nothing to look fields up on; keep what the webhook sent.
    if data.is_null() {
        return body.to_string();
    }

    let field = data.as_object().and_then(|object| {
        REPLY_FIELDS
            .iter()
            .filter_map(|name| object.get(*name))
            .find(|value| is_truthy(value))
    });

    match field {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => data.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_field_wins() {
        assert_eq!(normalize_reply(r#"{"reply":"X"}"#), "X");
    }

    #[test]
    fn array_uses_first_element() {
        assert_eq!(normalize_reply(r#"[{"message":"Y"},{"message":"Z"}]"#), "Y");
    }

    #[test]
    fn precedence_is_reply_message_text() {
        assert_eq!(
            normalize_reply(r#"{"text":"t","message":"m","reply":"r"}"#),
            "r"
        );
        assert_eq!(normalize_reply(r#"{"text":"t","message":"m"}"#), "m");
        assert_eq!(normalize_reply(r#"{"text":"t"}"#), "t");
    }

    #[test]
    fn empty_fields_fall_through() {
        assert_eq!(normalize_reply(r#"{"reply":"","text":"t"}"#), "t");
        assert_eq!(normalize_reply(r#"{"reply":null,"message":"m"}"#), "m");
    }

    #[test]
    fn unknown_object_is_stringified() {
        assert_eq!(normalize_reply(r#"{"foo": "bar"}"#), r#"{"foo":"bar"}"#);
    }

    #[test]
    fn stringified_object_keeps_webhook_key_order() {
        assert_eq!(
            normalize_reply(r#"{"status":"ok","code":1,"detail":"queued"}"#),
            r#"{"status":"ok","code":1,"detail":"queued"}"#
        );
        assert_eq!(
            normalize_reply(r#"[{"zeta":true,"alpha":[1,2]}]"#),
            r#"{"zeta":true,"alpha":[1,2]}"#
        );
    }

    #[test]
    fn plain_text_is_returned_verbatim() {
        assert_eq!(normalize_reply("hello"), "hello");
        assert_eq!(normalize_reply(""), "");
    }

    #[test]
    fn scalars_and_empty_values() {
        assert_eq!(normalize_reply("42"), "42");
        assert_eq!(normalize_reply("[]"), "[]");
        assert_eq!(normalize_reply("[null]"), "[null]");
        assert_eq!(normalize_reply(r#""quoted""#), r#""quoted""#);
    }

    #[test]
    fn non_string_reply_is_rendered_as_json() {
        assert_eq!(normalize_reply(r#"{"reply":{"a":1}}"#), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn unreachable_webhook_yields_apology() {
        // Nothing listens on port 1.
        let relay = WebhookChatRelay::new(Client::new(), "http://127.0.0.1:1/webhook");
        assert_eq!(relay.send_message("hi").await, NETWORK_FAILURE_REPLY);
    }

    #[test]
    fn upstream_failure_mentions_status() {
        let text = upstream_failure_reply(502);
        assert!(text.contains("502"));
    }
}
