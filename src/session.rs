//! Caller-side orchestration of generations, history and project workspaces.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::GenerationError;
use crate::handler::{GenerationHandler, GenerationRequest, GenerationResult};
use crate::history::{HistoryEntry, HistoryStore};
use crate::project::{MemoryProjectStore, Project, ProjectStore, placeholder_markup};
use crate::settings::{MemorySettingsStore, SettingsStore};
use crate::store::StoreError;

/// Failure reported by a [`GenerateBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateFailure {
    /// Short text shown to the user.
    pub message: String,
    pub details: Option<String>,
    pub status: Option<u16>,
}

impl From<GenerationError> for GenerateFailure {
    fn from(err: GenerationError) -> Self {
        let status = err.http_status();
        Self {
            message: err.message,
            details: Some(err.details),
            status: Some(status),
        }
    }
}

/// Something that turns a prompt into sanitized markup.
#[async_trait]
pub trait GenerateBackend: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        override_credential: Option<&str>,
    ) -> Result<String, GenerateFailure>;
}

/// Runs the handler in-process.
pub struct LocalGenerator {
    handler: GenerationHandler,
    cancel: CancellationToken,
}

impl LocalGenerator {
    pub fn new(handler: GenerationHandler) -> Self {
        Self {
            handler,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts every generation started through this backend.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[async_trait]
impl GenerateBackend for LocalGenerator {
    async fn generate(
        &self,
        prompt: &str,
        override_credential: Option<&str>,
    ) -> Result<String, GenerateFailure> {
        let mut request = GenerationRequest::new(prompt);
        if let Some(key) = override_credential {
            request = request.with_override_credential(key);
        }
        let cancel = self.cancel.child_token();
        self.handler
            .handle(&request, &cancel)
            .await
            .map(|result| result.markup)
            .map_err(GenerateFailure::from)
    }
}

/// Notifications for the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// New markup for the preview pane.
    Rendered { markup: String },
    /// A generation failed; `message` is user-facing.
    Failed { message: String },
    /// The stored history list changed.
    HistoryChanged,
    /// The stored project list changed.
    ProjectsChanged,
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Another submission from this session is still outstanding.
    #[error("a generation is already in progress")]
    Busy,
    #[error("{message}")]
    Generation {
        message: String,
        status: Option<u16>,
    },
    #[error("project name must not be blank")]
    EmptyProjectName,
    #[error(transparent)]
    Store(#[from] StoreError),
}

const EVENT_CAPACITY: usize = 64;

/// One user's workspace: submits prompts, records successes, lists past results.
///
/// At most one submission is outstanding; a second one is refused rather than queued.
pub struct GenerationSession {
    backend: Arc<dyn GenerateBackend>,
    history: Arc<dyn HistoryStore>,
    projects: Arc<dyn ProjectStore>,
    settings: Arc<dyn SettingsStore>,
    override_credential: RwLock<Option<String>>,
    in_flight: AtomicBool,
    history_lock: Mutex<()>,
    projects_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

/// Clears the in-flight flag when the submission ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl GenerationSession {
    pub fn new(backend: Arc<dyn GenerateBackend>, history: Arc<dyn HistoryStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            history,
            projects: Arc::new(MemoryProjectStore::new()),
            settings: Arc::new(MemorySettingsStore::new()),
            override_credential: RwLock::new(None),
            in_flight: AtomicBool::new(false),
            history_lock: Mutex::new(()),
            projects_lock: Mutex::new(()),
            events,
        }
    }

    pub fn with_projects(mut self, projects: Arc<dyn ProjectStore>) -> Self {
        self.projects = projects;
        self
    }

    /// Where the override key is persisted. Defaults to process memory.
    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = settings;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Stores the user's own provider key; blank clears it.
    ///
    /// The key is only sent along with this session's requests.
    pub fn set_override_credential(&self, key: Option<String>) {
        let key = key.filter(|value| !value.trim().is_empty());
        match self.override_credential.write() {
            Ok(mut slot) => *slot = key,
            Err(poisoned) => *poisoned.into_inner() = key,
        }
    }

    pub fn override_credential(&self) -> Option<String> {
        match self.override_credential.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Loads the saved override key into the session. Returns whether one was found.
    pub async fn restore_override_credential(&self) -> Result<bool, SessionError> {
        let settings = self.settings.load().await?;
        self.set_override_credential(settings.api_key);
        Ok(self.override_credential().is_some())
    }

    /// Sets the override key and persists it; blank clears the saved key.
    pub async fn save_override_credential(&self, key: Option<String>) -> Result<(), SessionError> {
        self.set_override_credential(key);
        let mut settings = self.settings.load().await?;
        settings.api_key = self.override_credential();
        self.settings.save(&settings).await?;
        Ok(())
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn begin(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.in_flight))
    }

    /// Generates markup for `prompt`, emits the outcome and records successes.
    ///
    /// A history write failure is logged and does not turn a success into an error.
    ///
    /// # Errors
    ///
    /// [`SessionError::Busy`] when another submission is outstanding (no event is
    /// emitted), [`SessionError::Generation`] when the backend failed.
    pub async fn submit(&self, prompt: &str) -> Result<GenerationResult, SessionError> {
        let Some(_guard) = self.begin() else {
            return Err(SessionError::Busy);
        };

        let key = self.override_credential();
        match self.backend.generate(prompt, key.as_deref()).await {
            Ok(markup) => {
                let _ = self.events.send(SessionEvent::Rendered {
                    markup: markup.clone(),
                });
                if let Err(err) = self.record(prompt, &markup).await {
                    error!(error = %err, "failed to save history");
                }
                Ok(GenerationResult { markup })
            }
            Err(failure) => {
                warn!(
                    status = failure.status,
                    details = failure.details.as_deref().unwrap_or_default(),
                    "generation failed: {}",
                    failure.message
                );
                let _ = self.events.send(SessionEvent::Failed {
                    message: failure.message.clone(),
                });
                Err(SessionError::Generation {
                    message: failure.message,
                    status: failure.status,
                })
            }
        }
    }

    async fn record(&self, prompt: &str, markup: &str) -> Result<(), StoreError> {
        let _lock = self.history_lock.lock().await;
        let mut entries = self.history.load().await?;
        entries.insert(0, HistoryEntry::new(prompt, markup));
        self.history.save(&entries).await?;
        let _ = self.events.send(SessionEvent::HistoryChanged);
        Ok(())
    }

    /// Past generations, newest first.
    pub async fn history(&self) -> Result<Vec<HistoryEntry>, SessionError> {
        Ok(self.history.load().await?)
    }

    /// Markup of a stored entry, also sent to the preview pane.
    pub async fn open_history(&self, id: &str) -> Result<Option<String>, SessionError> {
        let entries = self.history.load().await?;
        let markup = entries
            .into_iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.markup);
        if let Some(markup) = &markup {
            let _ = self.events.send(SessionEvent::Rendered {
                markup: markup.clone(),
            });
        }
        Ok(markup)
    }

    /// Removes an entry. Returns whether anything was removed.
    pub async fn delete_history(&self, id: &str) -> Result<bool, SessionError> {
        let _lock = self.history_lock.lock().await;
        let mut entries = self.history.load().await?;
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.history.save(&entries).await?;
        let _ = self.events.send(SessionEvent::HistoryChanged);
        Ok(true)
    }

    /// Adds a project in front of the list.
    ///
    /// # Errors
    ///
    /// [`SessionError::EmptyProjectName`] when `name` is blank after trimming.
    pub async fn create_project(&self, name: &str) -> Result<Project, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyProjectName);
        }
        let _lock = self.projects_lock.lock().await;
        let mut projects = self.projects.load().await?;
        let project = Project::new(name);
        projects.insert(0, project.clone());
        self.projects.save(&projects).await?;
        let _ = self.events.send(SessionEvent::ProjectsChanged);
        Ok(project)
    }

    /// Known projects, newest first.
    pub async fn projects(&self) -> Result<Vec<Project>, SessionError> {
        Ok(self.projects.load().await?)
    }

    /// Placeholder markup for a project, also sent to the preview pane.
    pub async fn open_project(&self, id: &str) -> Result<Option<String>, SessionError> {
        let projects = self.projects.load().await?;
        let markup = projects
            .iter()
            .find(|project| project.id == id)
            .map(|project| placeholder_markup(&project.name));
        if let Some(markup) = &markup {
            let _ = self.events.send(SessionEvent::Rendered {
                markup: markup.clone(),
            });
        }
        Ok(markup)
    }

    /// Removes a project. Returns whether anything was removed.
    pub async fn delete_project(&self, id: &str) -> Result<bool, SessionError> {
        let _lock = self.projects_lock.lock().await;
        let mut projects = self.projects.load().await?;
        let before = projects.len();
        projects.retain(|project| project.id != id);
        if projects.len() == before {
            return Ok(false);
        }
        self.projects.save(&projects).await?;
        let _ = self.events.send(SessionEvent::ProjectsChanged);
        Ok(true)
    }
}
