//! Named project workspaces.
//!
//! A project is only a label for now: opening one shows a placeholder until the
//! user generates something for it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::{JsonFile, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now().timestamp_millis(),
        }
    }
}

/// Durable list storage for [`Project`] values, newest first.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn load(&self) -> Result<Vec<Project>, StoreError>;

    async fn save(&self, projects: &[Project]) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: Mutex<Vec<Project>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn load(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.projects.lock().await.clone())
    }

    async fn save(&self, projects: &[Project]) -> Result<(), StoreError> {
        *self.projects.lock().await = projects.to_vec();
        Ok(())
    }
}

/// Keeps the list as a JSON array in one file.
#[derive(Debug)]
pub struct JsonFileProjectStore {
    file: JsonFile,
}

impl JsonFileProjectStore {
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
impl ProjectStore for JsonFileProjectStore {
    async fn load(&self) -> Result<Vec<Project>, StoreError> {
        self.file.read().await
    }

    async fn save(&self, projects: &[Project]) -> Result<(), StoreError> {
        self.file.write(projects).await
    }
}

/// Markup shown for a freshly opened project that has nothing generated yet.
pub fn placeholder_markup(name: &str) -> String {
    format!(
        r#"<div class="flex h-full w-full items-center justify-center p-8">
  <div class="max-w-md text-center">
    <div class="mx-auto mb-6 flex h-16 w-16 items-center justify-center rounded-2xl bg-primary/10 text-primary">
      <svg xmlns="http://www.w3.org/2000/svg" class="h-8 w-8" fill="none" viewBox="0 0 24 24" stroke="currentColor" stroke-width="2"><path stroke-linecap="round" stroke-linejoin="round" d="M20 7l-8-4-8 4m16 0l-8 4m8-4v10l-8 4m0-10L4 7m8 4v10M4 7v10l8 4"/></svg>
    </div>
    <h2 class="text-2xl font-bold text-foreground">{}</h2>
    <p class="mt-2 text-muted-foreground">Ready to build. Describe your interface below to get started.</p>
  </div>
</div>"#,
        escape_html(name)
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
