use super::IncomingMessage;
use crate::history::safe_user_id;
use serde::Deserialize;
use serde_json::Value;
use subtle::ConstantTimeEq;

/// Header WaSender uses to carry the configured webhook secret.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Incomplete sender data")]
    MissingSender,
    #[error("Invalid message payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// What a webhook delivery asks us to do.
#[derive(Debug)]
pub enum WebhookEvent {
    /// Not a message upsert, or a message with no text to answer.
    Ignored,
    /// Echo of a message the bot sent itself.
    SelfSent { id: Option<String> },
    Text(IncomingMessage),
}

#[derive(Debug, Deserialize)]
struct WaMessage {
    #[serde(default)]
    key: MessageKey,
    message: Option<MessageContent>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageKey {
    #[serde(rename = "fromMe", default)]
    from_me: bool,
    id: Option<String>,
    #[serde(rename = "remoteJid")]
    remote_jid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    conversation: Option<String>,
    #[serde(rename = "extendedTextMessage")]
    extended_text: Option<ExtendedText>,
}

#[derive(Debug, Deserialize)]
struct ExtendedText {
    text: Option<String>,
}

impl MessageContent {
    /// `conversation` wins when it holds a string. A `null` conversation is
    /// treated like an absent one, so `extendedTextMessage.text` is used.
    fn text(self) -> Option<String> {
        self.conversation
            .or_else(|| self.extended_text.and_then(|e| e.text))
    }
}

/// Interpret a WaSender webhook payload.
pub fn parse_webhook(payload: &Value) -> Result<WebhookEvent, WebhookError> {
    if payload.get("event").and_then(Value::as_str) != Some("messages.upsert") {
        return Ok(WebhookEvent::Ignored);
    }
    let raw = match payload.get("data").and_then(|d| d.get("messages")) {
        Some(m) if !m.is_null() => m,
        _ => return Ok(WebhookEvent::Ignored),
    };
    let message: WaMessage = serde_json::from_value(raw.clone())?;

    if message.key.from_me {
        return Ok(WebhookEvent::SelfSent { id: message.key.id });
    }

    let sender = message
        .key
        .remote_jid
        .filter(|s| !s.is_empty())
        .ok_or(WebhookError::MissingSender)?;

    match message.message.and_then(MessageContent::text) {
        Some(content) if !content.is_empty() => Ok(WebhookEvent::Text(IncomingMessage {
            session_id: safe_user_id(&sender),
            sender,
            content,
            message_id: message.key.id,
        })),
        _ => Ok(WebhookEvent::Ignored),
    }
}

/// Constant-time check of the webhook secret header.
pub fn verify_secret(expected: &str, provided: Option<&str>) -> bool {
    match provided {
        Some(provided) => bool::from(expected.as_bytes().ct_eq(provided.as_bytes())),
        None => false,
    }
}
