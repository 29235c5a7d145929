//! Shared fakes for unit tests.

use crate::channels::{IncomingMessage, MessageKind, Transport};
use crate::history::HistoryRecord;
use crate::responder::ResponseGenerator;
use async_trait::async_trait;
use std::sync::Mutex;

/// Bind a router on an ephemeral local port and return its base URL.
pub async fn spawn_fake_upstream(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Always replies with the same text; records the history length it was given.
pub struct FixedGenerator {
    pub reply: String,
    pub seen_history: Mutex<Vec<usize>>,
}

impl FixedGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            seen_history: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ResponseGenerator for FixedGenerator {
    async fn generate(&self, _message: &str, history: &[HistoryRecord]) -> String {
        self.seen_history.lock().unwrap().push(history.len());
        self.reply.clone()
    }

    fn model_name(&self) -> &str {
        "fixed"
    }
}

/// Records sends; fails every send after `fail_after` successes.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail_after: Option<usize>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        recipient: &str,
        content: &str,
        _kind: MessageKind,
        _media_url: Option<&str>,
    ) -> bool {
        let mut sent = self.sent.lock().unwrap();
        if self.fail_after.is_some_and(|n| sent.len() >= n) {
            return false;
        }
        sent.push((recipient.to_string(), content.to_string()));
        true
    }
}

pub fn incoming(content: &str) -> IncomingMessage {
    IncomingMessage {
        sender: "1234@s.whatsapp.net".into(),
        session_id: "1234_s_whatsapp_net".into(),
        content: content.into(),
        message_id: None,
    }
}
