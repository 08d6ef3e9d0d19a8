//! Token holder
//!
//! The access token lives only in memory. The username hint is the one piece
//! of session state written to disk, so a restarted process knows a silent
//! refresh is worth attempting.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::client::error::ClientError;

/// Durable storage for the username hint
pub trait HintStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, ClientError>;
    fn save(&self, username: &str) -> Result<(), ClientError>;
    fn clear(&self) -> Result<(), ClientError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct HintFile {
    username: String,
}

/// JSON file hint store, e.g. `~/.taskauth/session.json`
#[derive(Debug, Clone)]
pub struct FileHintStore {
    path: PathBuf,
}

impl FileHintStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HintStore for FileHintStore {
    fn load(&self) -> Result<Option<String>, ClientError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let file = File::open(&self.path).map_err(|e| ClientError::Storage(e.to_string()))?;
        let hint: HintFile = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        Ok(Some(hint.username))
    }

    fn save(&self, username: &str) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| ClientError::Storage(e.to_string()))?;
        }

        let file = File::create(&self.path).map_err(|e| ClientError::Storage(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(
            &mut writer,
            &HintFile {
                username: username.to_string(),
            },
        )
        .map_err(|e| ClientError::Storage(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| ClientError::Storage(e.to_string()))
    }

    fn clear(&self) -> Result<(), ClientError> {
        if !self.path.exists() {
            return Ok(());
        }
        fs::remove_file(&self.path).map_err(|e| ClientError::Storage(e.to_string()))
    }
}

/// Hint store that forgets everything with the process
#[derive(Debug, Default)]
pub struct MemoryHintStore {
    hint: Mutex<Option<String>>,
}

impl MemoryHintStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hint(username: impl Into<String>) -> Self {
        Self {
            hint: Mutex::new(Some(username.into())),
        }
    }
}

impl HintStore for MemoryHintStore {
    fn load(&self) -> Result<Option<String>, ClientError> {
        Ok(self
            .hint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, username: &str) -> Result<(), ClientError> {
        *self.hint.lock().unwrap_or_else(PoisonError::into_inner) = Some(username.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        *self.hint.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Current access token plus the persisted username hint.
///
/// Cloning shares the same state.
#[derive(Clone)]
pub struct TokenHolder {
    token: Arc<watch::Sender<Option<String>>>,
    hints: Arc<dyn HintStore>,
}

impl TokenHolder {
    pub fn new(hints: Arc<dyn HintStore>) -> Self {
        let (token, _) = watch::channel(None);
        Self {
            token: Arc::new(token),
            hints,
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    /// Store a new access token. A `username` also replaces the hint; `None`
    /// leaves the existing hint in place.
    pub fn set_access_token(&self, token: impl Into<String>, username: Option<&str>) {
        self.token.send_replace(Some(token.into()));

        if let Some(username) = username
            && let Err(e) = self.hints.save(username)
        {
            tracing::warn!("Failed to persist username hint: {}", e);
        }
    }

    /// Drop the token and the hint
    pub fn clear(&self) {
        self.token.send_replace(None);
        if let Err(e) = self.hints.clear() {
            tracing::warn!("Failed to clear username hint: {}", e);
        }
    }

    pub fn username_hint(&self) -> Option<String> {
        match self.hints.load() {
            Ok(hint) => hint,
            Err(e) => {
                tracing::warn!("Ignoring unreadable username hint: {}", e);
                None
            }
        }
    }

    /// Follow token changes
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.token.subscribe()
    }
}

impl std::fmt::Debug for TokenHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHolder")
            .field("has_token", &self.token.borrow().is_some())
            .finish()
    }
}
