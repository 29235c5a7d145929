pub mod api;

use crate::channels::{IncomingMessage, Transport};
use crate::config::Config;
use crate::history::HistoryStore;
use crate::responder::ResponseGenerator;
use axum::Router;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Shared application state for all web handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub persona_name: String,
    pub history: Arc<dyn HistoryStore>,
    pub generator: Arc<dyn ResponseGenerator>,
    /// `None` when no WaSender token is configured.
    pub transport: Option<Arc<dyn Transport>>,
    /// Accepted text messages, consumed by the relay loop.
    pub queue: mpsc::UnboundedSender<IncomingMessage>,
}

/// Build the axum router with webhook and status routes.
pub fn build_router(state: AppState) -> Router {
    api::routes().with_state(state)
}

/// Serve the webhook and status routes until the listener fails.
pub async fn start_server(state: AppState) -> Result<(), anyhow::Error> {
    let addr = format!("{}:{}", state.config.web.bind, state.config.web.port);

    let app = build_router(state).layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
