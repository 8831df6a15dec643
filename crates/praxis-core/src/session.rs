use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::RwLock;

use praxis_types::Message;

/// Append-only per-key message logs. Messages are cloned on the way in and
/// out, so stored history can never alias a caller's working copy. The
/// store serializes access to its key map; concurrent callers for the same
/// key must serialize on their own.
pub struct SessionStore {
    base: PathBuf,
    logs: RwLock<HashMap<String, Vec<Message>>>,
}

impl SessionStore {
    pub async fn new(base: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base).await?;
        Ok(Self {
            base,
            logs: RwLock::new(HashMap::new()),
        })
    }

    fn file_path(&self, session_key: &str) -> PathBuf {
        let safe_name = session_key.replace(['/', ':'], "_");
        self.base.join(format!("{safe_name}.json"))
    }

    async fn ensure_loaded(&self, session_key: &str) {
        if self.logs.read().await.contains_key(session_key) {
            return;
        }
        let loaded = match fs::read_to_string(self.file_path(session_key)).await {
            Ok(raw) => serde_json::from_str::<Vec<Message>>(&raw).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        self.logs
            .write()
            .await
            .entry(session_key.to_string())
            .or_insert(loaded);
    }

    pub async fn append(&self, session_key: &str, message: &Message) {
        self.ensure_loaded(session_key).await;
        self.logs
            .write()
            .await
            .entry(session_key.to_string())
            .or_default()
            .push(message.clone());
    }

    /// Returns copies of the stored messages, in append order.
    pub async fn load(&self, session_key: &str) -> Vec<Message> {
        self.ensure_loaded(session_key).await;
        self.logs
            .read()
            .await
            .get(session_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Full replacement write of one session's serialized log.
    pub async fn save(&self, session_key: &str) -> anyhow::Result<()> {
        let snapshot = self.load(session_key).await;
        let payload = serde_json::to_string_pretty(&snapshot)?;
        fs::write(self.file_path(session_key), payload).await?;
        Ok(())
    }
}
