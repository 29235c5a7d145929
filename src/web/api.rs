use super::AppState;
use crate::channels::truncate;
use crate::channels::webhook::{self, WebhookError, WebhookEvent};
use crate::history::safe_user_id;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/clear_history/{user_id}", post(clear_history))
}

fn success(message: Option<&str>) -> Json<Value> {
    match message {
        Some(message) => Json(json!({ "status": "success", "message": message })),
        None => Json(json!({ "status": "success" })),
    }
}

async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if state.transport.is_none() {
        tracing::error!("WaSender client is not initialized. Cannot process webhook.");
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "WaSender client not initialized",
        ));
    }

    if let Some(secret) = state.config.webhook_secret() {
        let provided = headers
            .get(webhook::SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        if !webhook::verify_secret(secret, provided) {
            tracing::warn!("Rejected webhook with invalid signature");
            return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid webhook signature"));
        }
    }

    match webhook::parse_webhook(&payload)? {
        WebhookEvent::Ignored => Ok(success(None)),
        WebhookEvent::SelfSent { id } => {
            tracing::info!("Ignoring self-sent message: {}", id.as_deref().unwrap_or("?"));
            Ok(success(Some("Self-sent message ignored")))
        }
        WebhookEvent::Text(incoming) => {
            tracing::info!(
                "Message from {}: {}",
                incoming.sender,
                truncate(&incoming.content, 80)
            );
            state.queue.send(incoming).map_err(|_| {
                tracing::error!("Relay queue is closed");
                ApiError::internal()
            })?;
            Ok(success(None))
        }
    }
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    wasender_client: bool,
    gemini_client: bool,
    conversations_dir: bool,
    timestamp: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<&'static str>,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let wasender_client = state.transport.is_some();
    let gemini_client = state.generator.is_available();

    let mut issues = Vec::new();
    if !wasender_client {
        issues.push("WaSender client not initialized");
    }
    if !gemini_client {
        issues.push("Gemini API key not configured");
    }

    let code = if issues.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let health = HealthStatus {
        status: if issues.is_empty() { "ok" } else { "degraded" },
        wasender_client,
        gemini_client,
        conversations_dir: state.config.conversations_dir().exists(),
        timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        issues,
    };
    (code, Json(health))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "active",
        "version": env!("CARGO_PKG_VERSION"),
        "persona": state.persona_name,
        "services": {
            "wasender": state.transport.is_some(),
            "gemini": state.generator.is_available(),
        },
        "config": {
            "conversation_dir": state.config.conversations_dir(),
            "gemini_model": state.generator.model_name(),
        },
    }))
}

async fn clear_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let safe_id = safe_user_id(&user_id);
    let message = if state.history.clear(&safe_id).await? {
        tracing::info!("Cleared conversation history for {}", safe_id);
        format!("History cleared for {}", safe_id)
    } else {
        tracing::info!("No conversation history found for {}", safe_id);
        format!("No history found for {}", safe_id)
    };
    Ok(success(Some(&message)))
}

/// JSON error response: `{"status": "error", "message": ...}`.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }

    fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(json!({ "status": "error", "message": self.message })),
        )
            .into_response()
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        tracing::warn!("Rejected webhook: {}", err);
        match err {
            WebhookError::MissingSender => Self::new(StatusCode::BAD_REQUEST, &err.to_string()),
            WebhookError::Malformed(_) => Self::new(StatusCode::BAD_REQUEST, "Invalid message payload"),
        }
    }
}

impl From<crate::history::HistoryError> for ApiError {
    fn from(err: crate::history::HistoryError) -> Self {
        tracing::error!("History store error: {}", err);
        Self::internal()
    }
}
