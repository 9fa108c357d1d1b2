//! Identity store: resolves a user to the token used for pushing.

use async_trait::async_trait;
use std::collections::HashMap;

/// Source of push credentials keyed by user name
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Push token for `user`, or `None` when the user is unknown
    async fn push_credential(&self, user: &str) -> Option<String>;
}

/// Identity store backed by a fixed map, typically the config `identities` table
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityStore {
    credentials: HashMap<String, String>,
}

impl StaticIdentityStore {
    pub fn new(credentials: HashMap<String, String>) -> Self {
        Self { credentials }
    }

    /// Add or replace one user's token
    pub fn with_credential(mut self, user: impl Into<String>, token: impl Into<String>) -> Self {
        self.credentials.insert(user.into(), token.into());
        self
    }
}

#[async_trait]
impl IdentityStore for StaticIdentityStore {
    async fn push_credential(&self, user: &str) -> Option<String> {
        self.credentials
            .get(user)
            .filter(|token| !token.is_empty())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup() {
        let store = StaticIdentityStore::default()
            .with_credential("alice", "token-a")
            .with_credential("bob", "");

        assert_eq!(store.push_credential("alice").await.as_deref(), Some("token-a"));
        assert_eq!(store.push_credential("bob").await, None);
        assert_eq!(store.push_credential("carol").await, None);
    }
}
