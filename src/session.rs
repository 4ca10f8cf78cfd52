// Session/auth counter
// Demo sign-in persisted as a JSON key/value document, with a per-user request counter

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Fixed key the session is stored under
pub const SESSION_KEY: &str = "google_user_session";

const DEMO_NAME: &str = "Demo User";
const DEMO_EMAIL: &str = "demo@example.com";
const DEMO_AVATAR: &str = "data:image/svg+xml;base64,PHN2ZyB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciIHZpZXdCb3g9IjAgMCAyNCAyNCIgZmlsbD0iI2ZmZiIgd2lkdGg9IjQ4cHgiIGhlaWdodD0iNDhweCI+PHBhdGggZD0iTTEyIDJDNi40OCAyIDIgNi40OCAyIDEyczQuNDggMTAgMTAgMTAgMTAtNC40OCAxMC0xMFMxNy41MiAyIDEyIDJ6Ii8+PC9zdmc+";

/// Signed-in user and the number of inference calls made
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub name: String,
    pub email: String,
    pub picture: String,
    pub api_count: u64,
}

impl Session {
    pub fn demo() -> Self {
        Self {
            name: DEMO_NAME.to_string(),
            email: DEMO_EMAIL.to_string(),
            picture: DEMO_AVATAR.to_string(),
            api_count: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Session storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Session encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Where the session lives between runs
pub trait SessionStore: Send + Sync {
    fn sign_in(&self) -> Result<Session, SessionError>;
    fn sign_out(&self) -> Result<(), SessionError>;
    fn current_session(&self) -> Option<Session>;
    /// Bump the stored counter; fails with `NotSignedIn` when no session is stored
    fn increment_request_count(&self, session: &Session) -> Result<Session, SessionError>;
}

/// In-process store, lost on exit
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in() -> Self {
        Self {
            session: Mutex::new(Some(Session::demo())),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        // A poisoned lock still holds a consistent Option
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn sign_in(&self) -> Result<Session, SessionError> {
        let session = Session::demo();
        *self.slot() = Some(session.clone());
        Ok(session)
    }

    fn sign_out(&self) -> Result<(), SessionError> {
        *self.slot() = None;
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.slot().clone()
    }

    fn increment_request_count(&self, _session: &Session) -> Result<Session, SessionError> {
        let mut slot = self.slot();
        let current = slot.as_mut().ok_or(SessionError::NotSignedIn)?;
        current.api_count += 1;
        Ok(current.clone())
    }
}

/// File-backed store: a JSON object mapping keys to JSON-encoded strings
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the platform data directory
    pub fn default_location() -> Self {
        let path = dirs::data_dir()
            .map(|d| d.join("imagecraft"))
            .unwrap_or_else(|| PathBuf::from(".imagecraft"))
            .join("storage.json");
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>, SessionError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }

    fn write_session(&self, session: &Session) -> Result<(), SessionError> {
        let mut entries = self.load()?;
        entries.insert(SESSION_KEY.to_string(), serde_json::to_string(session)?);
        self.save(&entries)
    }
}

impl SessionStore for FileSessionStore {
    fn sign_in(&self) -> Result<Session, SessionError> {
        let session = Session::demo();
        self.write_session(&session)?;
        tracing::info!("Signed in as {}", session.email);
        Ok(session)
    }

    fn sign_out(&self) -> Result<(), SessionError> {
        let mut entries = self.load()?;
        if entries.remove(SESSION_KEY).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        let entries = match self.load() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Failed to read session storage {}: {}", self.path.display(), e);
                return None;
            }
        };
        let raw = entries.get(SESSION_KEY)?;
        match serde_json::from_str(raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::error!("Failed to parse stored session: {}", e);
                None
            }
        }
    }

    fn increment_request_count(&self, _session: &Session) -> Result<Session, SessionError> {
        let mut current = self.current_session().ok_or(SessionError::NotSignedIn)?;
        current.api_count += 1;
        self.write_session(&current)?;
        Ok(current)
    }
}
