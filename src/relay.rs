use crate::channels::{IncomingMessage, MessageKind, Transport};
use crate::chunker::ChunkLimits;
use crate::history::HistoryStore;
use crate::responder::ResponseGenerator;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Random pause between consecutive chunk sends.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min: min.min(max),
            max,
        }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    fn next_delay(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if min == max {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Result of relaying one incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub chunks: usize,
    pub sent: usize,
    pub saved: bool,
}

/// Reply pipeline: history -> generate -> chunk -> paced send -> save.
pub struct Relay {
    generator: Arc<dyn ResponseGenerator>,
    transport: Arc<dyn Transport>,
    history: Arc<dyn HistoryStore>,
    limits: ChunkLimits,
    pacing: Pacing,
}

impl Relay {
    pub fn new(
        generator: Arc<dyn ResponseGenerator>,
        transport: Arc<dyn Transport>,
        history: Arc<dyn HistoryStore>,
        limits: ChunkLimits,
        pacing: Pacing,
    ) -> Self {
        Self {
            generator,
            transport,
            history,
            limits,
            pacing,
        }
    }

    /// Answer one message. The first failed send stops the remaining chunks;
    /// the exchange is saved either way.
    pub async fn handle(&self, msg: &IncomingMessage) -> RelayOutcome {
        let history = self.history.load(&msg.session_id).await;
        let reply = self.generator.generate(&msg.content, &history).await;
        if reply.is_empty() {
            tracing::warn!("Empty reply for {}; nothing sent", msg.sender);
            return RelayOutcome {
                chunks: 0,
                sent: 0,
                saved: false,
            };
        }

        let chunks = self.limits.split(&reply);
        tracing::info!(
            "Sending {} message chunks to {} in reply to {}",
            chunks.len(),
            msg.sender,
            msg.message_id.as_deref().unwrap_or("?")
        );

        let mut sent = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            if !self
                .transport
                .send(&msg.sender, chunk, MessageKind::Text, None)
                .await
            {
                tracing::error!("Failed to send message chunk to {}", msg.sender);
                break;
            }
            sent += 1;
            if i + 1 < chunks.len() {
                tokio::time::sleep(self.pacing.next_delay()).await;
            }
        }

        let saved = match self
            .history
            .add_exchange(&msg.session_id, &msg.content, &reply)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Failed to save history for {}: {}", msg.session_id, e);
                false
            }
        };

        RelayOutcome {
            chunks: chunks.len(),
            sent,
            saved,
        }
    }

    /// Process queued messages one at a time until the queue closes.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<IncomingMessage>) {
        while let Some(msg) = rx.recv().await {
            let outcome = self.handle(&msg).await;
            tracing::debug!(
                "Relayed {}: {}/{} chunks sent, saved={}",
                msg.session_id,
                outcome.sent,
                outcome.chunks,
                outcome.saved
            );
        }
        tracing::info!("Relay queue closed");
    }
}
