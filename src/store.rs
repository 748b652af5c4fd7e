//! Durable per-user lists of saved searches.
//!
//! The backing document maps user ids to their searches and is always read
//! and written whole. Every mutation re-reads the document, applies its change
//! and writes the full map back, so entries of other users written by another
//! process in between are preserved.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::models::{Destination, SavedSearch, SearchFilter, UserId};

/// Whole persisted document: user id (as string, like the JSON keys) -> searches
pub type SearchMap = BTreeMap<String, Vec<SavedSearch>>;

/// Key-value document storage with whole-document semantics
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn read_all(&self) -> Result<SearchMap, StoreError>;
    async fn write_all(&self, map: &SearchMap) -> Result<(), StoreError>;
}

/// Stored record, accepting legacy layouts (no id, single `year_group`)
#[derive(Debug, Deserialize)]
struct StoredRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    destination: Option<Destination>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    manufacturer: String,
    model_group: String,
    model: String,
    trim: String,
    #[serde(default)]
    year_from: Option<i32>,
    #[serde(default)]
    year_to: Option<i32>,
    #[serde(default)]
    year_group: Option<i32>,
    #[serde(default)]
    mileage_from: u32,
    mileage_to: u32,
    #[serde(default)]
    color: Option<String>,
}

impl StoredRecord {
    fn into_saved(self, user_key: &str) -> Result<SavedSearch, StoreError> {
        let (year_from, year_to) = match (self.year_from, self.year_to, self.year_group) {
            (Some(from), Some(to), _) => (from, to),
            (_, _, Some(year)) => (year, year),
            _ => {
                return Err(StoreError::Format(serde::de::Error::custom(format!(
                    "record for user {} has no year range",
                    user_key
                ))))
            }
        };

        Ok(SavedSearch {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            destination: self
                .destination
                .unwrap_or_else(|| user_key.parse().unwrap_or_default()),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            filter: SearchFilter {
                manufacturer: self.manufacturer,
                model_group: self.model_group,
                model: self.model,
                trim: self.trim,
                year_from,
                year_to,
                mileage_from: self.mileage_from,
                mileage_to: self.mileage_to,
                color: self.color.filter(|c| !c.trim().is_empty()),
            },
        })
    }
}

/// Parse a stored document, migrating legacy records
pub fn parse_document(content: &str) -> Result<SearchMap, StoreError> {
    if content.trim().is_empty() {
        return Ok(SearchMap::new());
    }

    let raw: BTreeMap<String, Vec<StoredRecord>> = serde_json::from_str(content)?;
    raw.into_iter()
        .map(|(user, records)| {
            let searches = records
                .into_iter()
                .map(|r| r.into_saved(&user))
                .collect::<Result<Vec<_>, _>>()?;
            Ok::<_, StoreError>((user, searches))
        })
        .collect()
}

/// Pretty-printed JSON file, replaced atomically on write
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DurableStore for JsonFileStore {
    async fn read_all(&self) -> Result<SearchMap, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => parse_document(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SearchMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, map: &SearchMap) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), users = map.len(), "Saved searches written");
        Ok(())
    }
}

/// In-process document, for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryStore {
    doc: Mutex<SearchMap>,
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn read_all(&self) -> Result<SearchMap, StoreError> {
        Ok(self.doc.lock().await.clone())
    }

    async fn write_all(&self, map: &SearchMap) -> Result<(), StoreError> {
        *self.doc.lock().await = map.clone();
        Ok(())
    }
}

/// Saved-search CRUD on top of a [`DurableStore`]
pub struct SavedSearchStore {
    backend: Arc<dyn DurableStore>,
    /// Serializes read-modify-write cycles of this process
    write_lock: Mutex<()>,
}

impl SavedSearchStore {
    pub fn new(backend: Arc<dyn DurableStore>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    /// Append a search to the user's list, returning the new list length
    pub async fn append(&self, user: UserId, search: SavedSearch) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.backend.read_all().await?;
        let list = map.entry(user.to_string()).or_default();
        list.push(search);
        let len = list.len();
        self.backend.write_all(&map).await?;
        info!(user, count = len, "Saved search appended");
        Ok(len)
    }

    /// The user's searches in insertion order
    pub async fn list(&self, user: UserId) -> Result<Vec<SavedSearch>, StoreError> {
        let map = self.backend.read_all().await?;
        Ok(map.get(&user.to_string()).cloned().unwrap_or_default())
    }

    /// Remove the search at `index`; indices of later searches shift down.
    pub async fn delete_at(&self, user: UserId, index: usize) -> Result<SavedSearch, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.backend.read_all().await?;
        let key = user.to_string();

        let len = map.get(&key).map(Vec::len).unwrap_or(0);
        if index >= len {
            return Err(StoreError::NotFound { index, len });
        }

        let removed = match map.get_mut(&key) {
            Some(list) => list.remove(index),
            None => return Err(StoreError::NotFound { index, len }),
        };
        self.backend.write_all(&map).await?;
        info!(user, index, id = %removed.id, "Saved search deleted");
        Ok(removed)
    }

    /// Remove every search of the user, returning what was removed
    pub async fn delete_all(&self, user: UserId) -> Result<Vec<SavedSearch>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.backend.read_all().await?;

        let removed = map.remove(&user.to_string()).unwrap_or_default();
        if !removed.is_empty() {
            self.backend.write_all(&map).await?;
            info!(user, count = removed.len(), "All saved searches deleted");
        }
        Ok(removed)
    }

    /// Every persisted search with its owner
    pub async fn all(&self) -> Result<Vec<(UserId, SavedSearch)>, StoreError> {
        let map = self.backend.read_all().await?;
        let mut out = Vec::new();
        for (key, searches) in map {
            let Ok(user) = key.parse::<UserId>() else {
                warn!(key = %key, "Skipping saved searches under a non-numeric user id");
                continue;
            };
            out.extend(searches.into_iter().map(|s| (user, s)));
        }
        Ok(out)
    }

    /// Rewrite the document in the current schema, persisting ids assigned to
    /// legacy records. Returns the number of searches.
    pub async fn migrate(&self) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let map = self.backend.read_all().await?;
        let count = map.values().map(Vec::len).sum();
        self.backend.write_all(&map).await?;
        info!(count, "Saved searches migrated to the current schema");
        Ok(count)
    }
}
