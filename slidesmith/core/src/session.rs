//! Session Records
//!
//! A session is one slot a user generates into. The controller never owns the
//! record: it reports transitions as [`SessionUpdate`]s to a [`SessionStore`]
//! and the store decides where they live. [`MemorySessionStore`] keeps them
//! in memory and can write them to a JSON file.
//!
//! # Status transitions
//!
//! ```text
//! Idle ──> Generating ──┬──> Completed
//!   ^                   ├──> Error
//!   └───────────────────┘    (cancel)
//! ```

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::export::{sanitize_filename, Download, ExportFormat, GeneratedPrompt, DEFAULT_FILE_STEM};
use crate::prompt::GenerateRequest;
use crate::slide::{sort_by_number, Slide};

/// Title of a session nobody has named yet
pub const DEFAULT_TITLE: &str = "New Session";

/// Characters of the first slide title used for a derived session title
const TITLE_CHARS: usize = 30;

/// Session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session ID
    ///
    /// Uses an atomic counter combined with timestamp to ensure uniqueness
    /// even when multiple sessions are created in the same millisecond.
    #[must_use]
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};

        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let count = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("session_{}_{count}", now_ms()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a session stands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Nothing running
    #[default]
    Idle,
    /// A generation is streaming
    Generating,
    /// The last generation finished
    Completed,
    /// The last generation failed
    Error,
}

/// One reported transition
#[derive(Clone, Debug, PartialEq)]
pub enum SessionUpdate {
    /// New status
    Status(SessionStatus),
    /// Full slide list, sorted by slide number
    Slides(Vec<Slide>),
    /// Final combined artifact (or cleared)
    Prompt(Option<GeneratedPrompt>),
    /// Error message (or cleared)
    Error(Option<String>),
    /// Title derived from the slides; ignored once the session was named
    Title(String),
    /// Request that started the generation
    Config(Box<GenerateRequest>),
    /// Slides edited by hand; the artifact is rebuilt from them
    SlidesEdited(Vec<Slide>),
}

/// Receiver of session transitions
///
/// Called from the controller between awaits, so implementations must not
/// block.
pub trait SessionStore: Send + Sync {
    /// Apply one update to the session in `slot`
    fn apply(&self, slot: &SessionId, update: SessionUpdate);
}

/// Persisted state of one session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session ID
    pub id: SessionId,
    /// Display title
    pub title: String,
    /// Whether the title is still the default
    pub is_default_title: bool,
    /// Creation time (Unix ms)
    pub created_at: u64,
    /// Last change (Unix ms)
    pub updated_at: u64,
    /// Request used by the last generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<GenerateRequest>,
    /// Current status
    pub status: SessionStatus,
    /// Slides surfaced so far, sorted by number
    pub slides: Vec<Slide>,
    /// Final artifact of the last completed generation
    pub generated_prompt: Option<GeneratedPrompt>,
    /// Error of the last failed generation
    pub error: Option<String>,
}

impl SessionRecord {
    /// Fresh idle session
    #[must_use]
    pub fn new(id: SessionId) -> Self {
        let now = now_ms();
        Self {
            id,
            title: DEFAULT_TITLE.to_string(),
            is_default_title: true,
            created_at: now,
            updated_at: now,
            config: None,
            status: SessionStatus::Idle,
            slides: Vec::new(),
            generated_prompt: None,
            error: None,
        }
    }

    /// Apply one update
    pub fn apply(&mut self, update: SessionUpdate) {
        match update {
            SessionUpdate::Status(status) => self.status = status,
            SessionUpdate::Slides(slides) => self.slides = slides,
            SessionUpdate::Prompt(prompt) => self.generated_prompt = prompt,
            SessionUpdate::Error(error) => self.error = error,
            SessionUpdate::Title(title) => {
                if self.is_default_title {
                    self.title = title;
                    self.is_default_title = false;
                }
            }
            SessionUpdate::Config(config) => self.config = Some(*config),
            SessionUpdate::SlidesEdited(mut slides) => {
                sort_by_number(&mut slides);
                self.generated_prompt = Some(GeneratedPrompt::from_slides(slides.clone()));
                self.slides = slides;
            }
        }
        self.updated_at = now_ms();
    }

    /// Render the session as a download
    ///
    /// Markdown and text use the artifact's slides when there is one and
    /// yield `None` when there are no slides to write.
    ///
    /// # Errors
    ///
    /// Propagates JSON serialization failures.
    pub fn export(&self, format: ExportFormat) -> Result<Option<Download>, serde_json::Error> {
        let content = match format {
            ExportFormat::Json => serde_json::to_string_pretty(&SessionExport {
                title: &self.title,
                created_at: self.created_at,
                updated_at: self.updated_at,
                config: self.config.as_ref(),
                slides: &self.slides,
                generated_prompt: self.generated_prompt.as_ref(),
            })?,
            ExportFormat::Markdown | ExportFormat::Text => {
                let slides = self
                    .generated_prompt
                    .as_ref()
                    .map_or(&self.slides, |prompt| &prompt.slides);
                if slides.is_empty() {
                    return Ok(None);
                }
                let prompt = GeneratedPrompt::from_slides(slides.clone());
                if format == ExportFormat::Markdown {
                    prompt.to_markdown(&self.title)
                } else {
                    prompt.to_text(&self.title)
                }
            }
        };

        Ok(Some(Download {
            file_name: format!(
                "{}.{}",
                sanitize_filename(&self.title, DEFAULT_FILE_STEM),
                format.extension()
            ),
            content,
        }))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionExport<'a> {
    title: &'a str,
    created_at: u64,
    updated_at: u64,
    config: Option<&'a GenerateRequest>,
    slides: &'a [Slide],
    generated_prompt: Option<&'a GeneratedPrompt>,
}

/// Title derived from the first slide: 30 characters, `...` when cut
#[must_use]
pub fn derive_title(first_slide_title: &str) -> String {
    let mut chars = first_slide_title.chars();
    let head: String = chars.by_ref().take(TITLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Errors reading or writing a sessions file
#[derive(Debug, Error)]
pub enum PersistError {
    /// File system failure
    #[error("Failed to access sessions file at {path}: {source}")]
    Io {
        /// File that was accessed
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// File content is not a sessions document
    #[error("Invalid sessions file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionsFile {
    sessions: Vec<SessionRecord>,
}

/// Session store kept in memory, newest session first
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<Vec<SessionRecord>>,
}

impl MemorySessionStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new idle session and return its ID
    pub fn create(&self) -> SessionId {
        let id = SessionId::new();
        self.sessions.write().insert(0, SessionRecord::new(id.clone()));
        tracing::debug!(session = %id, "Created session");
        id
    }

    /// Snapshot of one session
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions.read().iter().find(|s| &s.id == id).cloned()
    }

    /// Snapshot of every session
    #[must_use]
    pub fn list(&self) -> Vec<SessionRecord> {
        self.sessions.read().clone()
    }

    /// Give a session an explicit title
    pub fn rename(&self, id: &SessionId, title: impl Into<String>) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.iter_mut().find(|s| &s.id == id) {
            Some(record) => {
                record.title = title.into();
                record.is_default_title = false;
                record.updated_at = now_ms();
                true
            }
            None => false,
        }
    }

    /// Replace a session's slides with edited ones
    ///
    /// Returns the rebuilt artifact, or `None` for an unknown session.
    pub fn edit_slides(&self, id: &SessionId, slides: Vec<Slide>) -> Option<GeneratedPrompt> {
        let mut sessions = self.sessions.write();
        let record = sessions.iter_mut().find(|s| &s.id == id)?;
        record.apply(SessionUpdate::SlidesEdited(slides));
        tracing::info!(session = %id, slides = record.slides.len(), "Slides edited");
        record.generated_prompt.clone()
    }

    /// Remove a session; returns whether it existed
    pub fn delete(&self, id: &SessionId) -> bool {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|s| &s.id != id);
        sessions.len() != before
    }

    /// Number of sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether the store holds no sessions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Write every session to a JSON file
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if serialization or the write fails.
    pub async fn save_to(&self, path: &Path) -> Result<(), PersistError> {
        let document = SessionsFile {
            sessions: self.list(),
        };
        let json = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|source| PersistError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(path = %path.display(), sessions = document.sessions.len(), "Saved sessions");
        Ok(())
    }

    /// Load sessions from a JSON file written by [`save_to`](Self::save_to)
    ///
    /// Sessions left in `Generating` are reset to `Idle`; the stream that
    /// fed them is gone.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if the file cannot be read or parsed.
    pub async fn load_from(path: &Path) -> Result<Self, PersistError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| PersistError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let mut document: SessionsFile = serde_json::from_str(&contents)?;

        for session in &mut document.sessions {
            if session.status == SessionStatus::Generating {
                session.status = SessionStatus::Idle;
            }
        }

        tracing::info!(path = %path.display(), sessions = document.sessions.len(), "Loaded sessions");
        Ok(Self {
            sessions: RwLock::new(document.sessions),
        })
    }
}

impl SessionStore for MemorySessionStore {
    fn apply(&self, slot: &SessionId, update: SessionUpdate) {
        let mut sessions = self.sessions.write();
        match sessions.iter_mut().find(|s| &s.id == slot) {
            Some(record) => record.apply(update),
            None => tracing::warn!(session = %slot, "Update for unknown session dropped"),
        }
    }
}

/// Get current timestamp in milliseconds
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
