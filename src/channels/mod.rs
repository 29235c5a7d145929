pub mod webhook;
pub mod whatsapp;

use async_trait::async_trait;

/// An incoming text message from WhatsApp.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Raw sender JID (e.g. "1234@s.whatsapp.net"); replies go here.
    pub sender: String,
    /// Filesystem-safe history key derived from `sender`.
    pub session_id: String,
    pub content: String,
    /// WaSender message id, when the webhook carried one.
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::Audio => "audio",
            MessageKind::Document => "document",
        }
    }
}

/// Outbound transport. Failures are reported as `false`, never raised.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        content: &str,
        kind: MessageKind,
        media_url: Option<&str>,
    ) -> bool;
}

/// Shorten `s` to at most `max` chars for log lines, appending "..." when cut.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}
