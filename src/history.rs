//! Generation history storage.
//!
//! Stores are plain list storage: callers read the whole list, change it and write it
//! back. Entries are kept newest first.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::{JsonFile, StoreError};

/// One successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub prompt: String,
    /// Sanitized markup, byte-for-byte as returned to the caller.
    #[serde(rename = "code")]
    pub markup: String,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "timestamp")]
    pub created_at: i64,
}

impl HistoryEntry {
    /// Creates an entry with a fresh unique id stamped with the current time.
    pub fn new(prompt: impl Into<String>, markup: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            markup: markup.into(),
            created_at: Utc::now().timestamp_millis(),
        }
    }
}

/// Durable list storage for [`HistoryEntry`] values.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Reads the stored list, newest first. An empty store yields an empty list.
    async fn load(&self) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Replaces the stored list.
    async fn save(&self, entries: &[HistoryEntry]) -> Result<(), StoreError>;
}

/// Process-local store, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self.entries.lock().await.clone())
    }

    async fn save(&self, entries: &[HistoryEntry]) -> Result<(), StoreError> {
        *self.entries.lock().await = entries.to_vec();
        Ok(())
    }
}

/// Keeps the list as a JSON array in one file.
#[derive(Debug)]
pub struct JsonFileHistoryStore {
    file: JsonFile,
}

impl JsonFileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[async_trait]
impl HistoryStore for JsonFileHistoryStore {
    async fn load(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        self.file.read().await
    }

    async fn save(&self, entries: &[HistoryEntry]) -> Result<(), StoreError> {
        self.file.write(entries).await
    }
}
