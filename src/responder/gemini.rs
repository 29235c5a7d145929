//! Gemini driver over the Generative Language `generateContent` endpoint.
//!
//! Auth uses the `x-goog-api-key` header.

use super::{ResponseGenerator, EMPTY_REPLY, ERROR_REPLY, UNUSUAL_REPLY};
use crate::channels::truncate;
use crate::history::{HistoryRecord, Role};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    system_instruction: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, base_url: &str, system_instruction: &str) -> Self {
        tracing::info!("Gemini client initialized with model: {}", model);
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            system_instruction: system_instruction.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    async fn request(&self, body: &Value) -> anyhow::Result<Value> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .context("Gemini request failed")?
            .error_for_status()
            .context("Gemini returned an error status")?;
        Ok(response.json().await?)
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

/// Build the `generateContent` body: prior history followed by the new user turn.
pub fn build_request_body(system_instruction: &str, message: &str, history: &[HistoryRecord]) -> Value {
    let mut contents: Vec<Value> = history
        .iter()
        .map(|record| {
            let parts: Vec<Value> = record.parts.iter().map(|p| json!({ "text": p })).collect();
            json!({ "role": role_name(record.role), "parts": parts })
        })
        .collect();
    contents.push(json!({ "role": "user", "parts": [{ "text": message }] }));

    json!({
        "systemInstruction": { "parts": [{ "text": system_instruction }] },
        "contents": contents,
    })
}

/// What a `generateContent` response yielded.
#[derive(Debug, PartialEq, Eq)]
pub enum Extracted {
    Text(String),
    /// No candidates, or candidates whose text is blank.
    Empty,
    /// A first candidate exists but carries no text parts.
    Unusual,
}

/// All text parts of the first candidate, concatenated and trimmed.
pub fn extract_reply(response: &Value) -> Extracted {
    let first = match response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    {
        Some(first) => first,
        None => return Extracted::Empty,
    };
    let texts: Vec<&str> = first
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if texts.is_empty() {
        return Extracted::Unusual;
    }
    let text = texts.concat();
    match text.trim() {
        "" => Extracted::Empty,
        trimmed => Extracted::Text(trimmed.to_string()),
    }
}

#[async_trait]
impl ResponseGenerator for GeminiClient {
    async fn generate(&self, message: &str, history: &[HistoryRecord]) -> String {
        tracing::info!("Sending prompt to Gemini: {}", truncate(message, 200));
        let body = build_request_body(&self.system_instruction, message, history);

        match self.request(&body).await {
            Ok(response) => match extract_reply(&response) {
                Extracted::Text(text) => text,
                Extracted::Unusual => {
                    tracing::error!("Error parsing Gemini response candidates: {}", response);
                    UNUSUAL_REPLY.to_string()
                }
                Extracted::Empty => {
                    tracing::error!("Gemini returned an empty or unexpected response: {}", response);
                    EMPTY_REPLY.to_string()
                }
            },
            Err(e) => {
                tracing::error!("Error calling Gemini API: {:#}", e);
                ERROR_REPLY.to_string()
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_fake_upstream;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::Json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_build_request_body() {
        let history = vec![HistoryRecord::user("hi"), HistoryRecord::model("hello")];
        let body = build_request_body("Be kind.", "how are you?", &history);

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be kind.");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], "hello");
        assert_eq!(contents[2]["parts"][0]["text"], "how are you?");
    }

    #[test]
    fn test_extract_reply() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "  Hello " }, { "text": "there\n" }] } }]
        });
        assert_eq!(extract_reply(&response), Extracted::Text("Hello there".into()));

        assert_eq!(extract_reply(&json!({ "candidates": [] })), Extracted::Empty);
        assert_eq!(extract_reply(&json!({ "promptFeedback": {} })), Extracted::Empty);
        let blank = json!({ "candidates": [{ "content": { "parts": [{ "text": "   " }] } }] });
        assert_eq!(extract_reply(&blank), Extracted::Empty);
    }

    #[test]
    fn test_extract_reply_unusual_structure() {
        let no_content = json!({ "candidates": [{ "finishReason": "SAFETY" }] });
        assert_eq!(extract_reply(&no_content), Extracted::Unusual);
        let no_text = json!({ "candidates": [{ "content": { "parts": [{ "inlineData": {} }] } }] });
        assert_eq!(extract_reply(&no_text), Extracted::Unusual);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Option<(String, Option<String>, Value)>>>);

    async fn fake_generate(
        State(captured): State<Captured>,
        uri: Uri,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let key = headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        *captured.0.lock().unwrap() = Some((uri.path().to_string(), key, body));
        Json(json!({ "candidates": [{ "content": { "parts": [{ "text": "Hi from Gemini" }] } }] }))
    }

    #[tokio::test]
    async fn test_generate_against_fake_upstream() {
        let captured = Captured::default();
        let app = axum::Router::new()
            .fallback(fake_generate)
            .with_state(captured.clone());
        let base_url = spawn_fake_upstream(app).await;

        let client = GeminiClient::new("gm-key", "test-model", &base_url, "Be kind.");
        let reply = client.generate("hello", &[HistoryRecord::user("earlier")]).await;
        assert_eq!(reply, "Hi from Gemini");

        let (path, key, body) = captured.0.lock().unwrap().clone().unwrap();
        assert_eq!(path, "/v1beta/models/test-model:generateContent");
        assert_eq!(key.as_deref(), Some("gm-key"));
        assert_eq!(body["contents"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_generate_error_status_falls_back() {
        let app = axum::Router::new().fallback(|| async { StatusCode::INTERNAL_SERVER_ERROR });
        let base_url = spawn_fake_upstream(app).await;

        let client = GeminiClient::new("gm-key", "test-model", &base_url, "Be kind.");
        assert_eq!(client.generate("hello", &[]).await, ERROR_REPLY);
    }

    #[tokio::test]
    async fn test_generate_empty_candidates_falls_back() {
        let app = axum::Router::new().fallback(|| async { Json(json!({ "candidates": [] })) });
        let base_url = spawn_fake_upstream(app).await;

        let client = GeminiClient::new("gm-key", "test-model", &base_url, "Be kind.");
        assert_eq!(client.generate("hello", &[]).await, EMPTY_REPLY);
    }

    #[tokio::test]
    async fn test_generate_unusual_structure_falls_back() {
        let app = axum::Router::new()
            .fallback(|| async { Json(json!({ "candidates": [{ "finishReason": "SAFETY" }] })) });
        let base_url = spawn_fake_upstream(app).await;

        let client = GeminiClient::new("gm-key", "test-model", &base_url, "Be kind.");
        assert_eq!(client.generate("hello", &[]).await, UNUSUAL_REPLY);
    }
}
