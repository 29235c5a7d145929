use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Join error: {0}")]
    JoinError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One role-tagged message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub role: Role,
    pub parts: Vec<String>,
}

impl HistoryRecord {
    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            parts: vec![text.to_string()],
        }
    }

    pub fn model(text: &str) -> Self {
        Self {
            role: Role::Model,
            parts: vec![text.to_string()],
        }
    }
}

/// Replace every non-alphanumeric character with `_`.
pub fn safe_user_id(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Per-user conversation history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load history, oldest first. Missing or malformed records load as empty.
    async fn load(&self, user_id: &str) -> Vec<HistoryRecord>;

    async fn save(&self, user_id: &str, history: &[HistoryRecord]) -> Result<(), HistoryError>;

    /// Remove a user's history. Returns whether anything was removed.
    async fn clear(&self, user_id: &str) -> Result<bool, HistoryError>;

    /// Append a user/model exchange and persist it.
    async fn add_exchange(
        &self,
        user_id: &str,
        user_message: &str,
        model_response: &str,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let mut history = self.load(user_id).await;
        history.push(HistoryRecord::user(user_message));
        history.push(HistoryRecord::model(model_response));
        self.save(user_id, &history).await?;
        Ok(history)
    }
}

/// Flat store: one pretty-printed JSON array per user in `dir`.
#[derive(Clone)]
pub struct FileHistoryStore {
    dir: Arc<PathBuf>,
    max_history: usize,
}

impl FileHistoryStore {
    /// `max_history` counts exchanges; loads keep the last `2 * max_history` records.
    pub fn new(dir: impl Into<PathBuf>, max_history: usize) -> Self {
        Self {
            dir: Arc::new(dir.into()),
            max_history,
        }
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_user_id(user_id)))
    }

    /// Run blocking file I/O on a spawn_blocking thread.
    async fn exec<F, T>(&self, f: F) -> Result<T, HistoryError>
    where
        F: FnOnce() -> Result<T, HistoryError> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| HistoryError::JoinError(e.to_string()))?
    }
}

fn read_history(path: &Path) -> Result<Option<Vec<HistoryRecord>>, HistoryError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&raw)?))
}

fn trim_history(mut history: Vec<HistoryRecord>, max_history: usize) -> Vec<HistoryRecord> {
    let keep = max_history.saturating_mul(2);
    if history.len() > keep {
        history.drain(..history.len() - keep);
    }
    history
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn load(&self, user_id: &str) -> Vec<HistoryRecord> {
        let path = self.path_for(user_id);
        let shown = path.display().to_string();
        match self.exec(move || read_history(&path)).await {
            Ok(Some(history)) => {
                let total = history.len();
                let history = trim_history(history, self.max_history);
                if history.len() < total {
                    tracing::info!(
                        "Trimming history for {} to last {} exchanges",
                        user_id,
                        self.max_history
                    );
                }
                history
            }
            Ok(None) => Vec::new(),
            Err(HistoryError::Serde(e)) => {
                tracing::warn!("Invalid history format in {}: {}. Starting fresh.", shown, e);
                Vec::new()
            }
            Err(e) => {
                tracing::error!("Failed to load history from {}: {}", shown, e);
                Vec::new()
            }
        }
    }

    async fn save(&self, user_id: &str, history: &[HistoryRecord]) -> Result<(), HistoryError> {
        let dir = self.dir.clone();
        let path = self.path_for(user_id);
        let json = serde_json::to_string_pretty(history)?;
        self.exec(move || {
            std::fs::create_dir_all(dir.as_path())?;
            std::fs::write(&path, json)?;
            Ok(())
        })
        .await
    }

    async fn clear(&self, user_id: &str) -> Result<bool, HistoryError> {
        let path = self.path_for(user_id);
        self.exec(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        })
        .await
    }
}
