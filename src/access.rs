use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use crate::models::UserId;

/// Decides whether a user may use the bot
pub trait AccessGate: Send + Sync {
    fn is_authorized(&self, user: UserId) -> bool;
}

/// Allow-list loaded from `access.json` (a JSON array of user ids)
#[derive(Debug, Clone, Default)]
pub struct AccessList {
    users: HashSet<UserId>,
    manager: Option<UserId>,
}

impl AccessList {
    pub fn new(users: impl IntoIterator<Item = UserId>, manager: Option<UserId>) -> Self {
        Self {
            users: users.into_iter().collect(),
            manager,
        }
    }

    /// Load the allow-list; an unreadable file yields an empty list.
    pub async fn load(path: &Path, manager: Option<UserId>) -> Self {
        let users = match tokio::fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str::<Vec<UserId>>(&content) {
                Ok(users) => users,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not parse access list");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read access list");
                Vec::new()
            }
        };

        info!(count = users.len(), "Access list loaded");
        Self::new(users, manager)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl AccessGate for AccessList {
    fn is_authorized(&self, user: UserId) -> bool {
        self.manager == Some(user) || self.users.contains(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_is_always_authorized() {
        let list = AccessList::new([1, 2], Some(99));
        assert!(list.is_authorized(1));
        assert!(list.is_authorized(99));
        assert!(!list.is_authorized(3));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.json");
        std::fs::write(&path, "[604303416, 728438182]").unwrap();

        let list = AccessList::load(&path, None).await;
        assert_eq!(list.len(), 2);
        assert!(list.is_authorized(728438182));
    }

    #[tokio::test]
    async fn test_missing_or_broken_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = AccessList::load(&dir.path().join("nope.json"), None).await;
        assert!(missing.is_empty());

        let path = dir.path().join("access.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(AccessList::load(&path, Some(5)).await.is_empty());
    }
}
