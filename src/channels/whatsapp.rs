use super::{MessageKind, Transport};
use crate::config::WhatsAppConfig;
use async_trait::async_trait;
use serde_json::{json, Value};

/// WhatsApp transport over the WaSender REST API.
pub struct WaSenderTransport {
    client: reqwest::Client,
    api_token: String,
    base_url: String,
}

impl WaSenderTransport {
    pub fn new(api_token: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_token: api_token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build from config. `None` when no API token is configured.
    pub fn from_config(config: &WhatsAppConfig) -> Option<Self> {
        let token = config.api_token.as_deref().filter(|t| !t.is_empty())?;
        Some(Self::new(token, &config.base_url))
    }

    async fn post(&self, body: &Value) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/api/send-message", self.base_url))
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Strip the `@s.whatsapp.net` suffix from a JID.
pub fn format_recipient(recipient: &str) -> &str {
    if recipient.contains("@s.whatsapp.net") {
        recipient.split('@').next().unwrap_or(recipient)
    } else {
        recipient
    }
}

/// Request body for one send, or `None` for a media kind lacking a URL.
pub fn build_send_body(
    to: &str,
    content: &str,
    kind: MessageKind,
    media_url: Option<&str>,
) -> Option<Value> {
    let caption = (!content.is_empty()).then_some(content);
    let media_field = match kind {
        MessageKind::Text => return Some(json!({ "to": to, "text": content })),
        MessageKind::Image => "imageUrl",
        MessageKind::Video => "videoUrl",
        MessageKind::Audio => "audioUrl",
        MessageKind::Document => "documentUrl",
    };
    let url = media_url.filter(|u| !u.is_empty())?;

    let mut body = json!({ "to": to });
    body[media_field] = json!(url);
    if kind != MessageKind::Audio {
        if let Some(caption) = caption {
            body["text"] = json!(caption);
        }
    }
    Some(body)
}

#[async_trait]
impl Transport for WaSenderTransport {
    async fn send(
        &self,
        recipient: &str,
        content: &str,
        kind: MessageKind,
        media_url: Option<&str>,
    ) -> bool {
        let to = format_recipient(recipient);
        let Some(body) = build_send_body(to, content, kind, media_url) else {
            tracing::error!("Media URL is required for message type '{}'.", kind.as_str());
            return false;
        };

        match self.post(&body).await {
            Ok(()) => {
                tracing::info!("{} message sent to {}.", kind.as_str(), recipient);
                true
            }
            Err(e) => {
                tracing::error!(
                    "WaSender error sending {} to {}: {:#}",
                    kind.as_str(),
                    recipient,
                    e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_fake_upstream;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_format_recipient() {
        assert_eq!(format_recipient("1234@s.whatsapp.net"), "1234");
        assert_eq!(format_recipient("+1234"), "+1234");
        assert_eq!(format_recipient("group@g.us"), "group@g.us");
    }

    #[test]
    fn test_text_body() {
        let body = build_send_body("1234", "hello", MessageKind::Text, None).unwrap();
        assert_eq!(body, json!({ "to": "1234", "text": "hello" }));
    }

    #[test]
    fn test_media_bodies() {
        let image = build_send_body("1", "look", MessageKind::Image, Some("http://x/a.png")).unwrap();
        assert_eq!(image, json!({ "to": "1", "imageUrl": "http://x/a.png", "text": "look" }));

        let doc = build_send_body("1", "", MessageKind::Document, Some("http://x/a.pdf")).unwrap();
        assert_eq!(doc, json!({ "to": "1", "documentUrl": "http://x/a.pdf" }));

        let audio = build_send_body("1", "ignored", MessageKind::Audio, Some("http://x/a.ogg")).unwrap();
        assert_eq!(audio, json!({ "to": "1", "audioUrl": "http://x/a.ogg" }));
    }

    #[test]
    fn test_media_without_url_is_rejected() {
        assert!(build_send_body("1", "hi", MessageKind::Video, None).is_none());
        assert!(build_send_body("1", "hi", MessageKind::Image, Some("")).is_none());
    }

    #[test]
    fn test_from_config_requires_token() {
        let config = WhatsAppConfig {
            api_token: None,
            webhook_secret: None,
            base_url: "http://localhost".into(),
        };
        assert!(WaSenderTransport::from_config(&config).is_none());
    }

    #[derive(Clone, Default)]
    struct Sent(Arc<Mutex<Vec<(Option<String>, Value)>>>);

    async fn fake_send(
        State(sent): State<Sent>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        sent.0.lock().unwrap().push((auth, body));
        Json(json!({ "success": true }))
    }

    #[tokio::test]
    async fn test_send_text_against_fake_upstream() {
        let sent = Sent::default();
        let app = axum::Router::new()
            .route("/api/send-message", post(fake_send))
            .with_state(sent.clone());
        let base_url = spawn_fake_upstream(app).await;

        let transport = WaSenderTransport::new("wa-token", &base_url);
        assert!(transport.send("1234@s.whatsapp.net", "hi", MessageKind::Text, None).await);

        let sent = sent.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.as_deref(), Some("Bearer wa-token"));
        assert_eq!(sent[0].1, json!({ "to": "1234", "text": "hi" }));
    }

    #[tokio::test]
    async fn test_send_failure_returns_false() {
        let app = axum::Router::new()
            .route("/api/send-message", post(|| async { StatusCode::TOO_MANY_REQUESTS }));
        let base_url = spawn_fake_upstream(app).await;

        let transport = WaSenderTransport::new("wa-token", &base_url);
        assert!(!transport.send("1234", "hi", MessageKind::Text, None).await);
        assert!(!transport.send("1234", "hi", MessageKind::Audio, None).await);
    }
}
