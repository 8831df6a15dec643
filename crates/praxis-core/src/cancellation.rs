use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Per-session cancellation tokens. Creating a token for a session that
/// already has one cancels the old token first, so a new turn always
/// supersedes a stuck one.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, session_key: &str) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self
            .tokens
            .write()
            .await
            .insert(session_key.to_string(), token.clone())
        {
            previous.cancel();
        }
        token
    }

    pub async fn cancel(&self, session_key: &str) -> bool {
        let Some(token) = self.tokens.read().await.get(session_key).cloned() else {
            return false;
        };
        token.cancel();
        true
    }

    pub async fn remove(&self, session_key: &str) {
        self.tokens.write().await.remove(session_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creating_a_new_token_cancels_the_previous_one() {
        let registry = CancellationRegistry::new();
        let first = registry.create("cli:default").await;
        assert!(!first.is_cancelled());

        let second = registry.create("cli:default").await;
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_reports_whether_a_token_existed() {
        let registry = CancellationRegistry::new();
        assert!(!registry.cancel("missing").await);

        let token = registry.create("cli:default").await;
        assert!(registry.cancel("cli:default").await);
        assert!(token.is_cancelled());

        registry.remove("cli:default").await;
        assert!(!registry.cancel("cli:default").await);
    }
}
