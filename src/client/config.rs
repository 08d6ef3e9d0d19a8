//! Client configuration

use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on a single refresh call
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

const HINT_DIR: &str = ".taskauth";
const HINT_FILE: &str = "session.json";

/// Settings for [`crate::client::AccountClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server root, e.g. `http://localhost:5000`
    pub base_url: String,
    pub refresh_timeout: Duration,
    /// Where the username hint survives restarts
    pub hint_path: PathBuf,
    /// Re-allow a suppressed notification after this long. `None` keeps it
    /// suppressed until dismissed.
    pub notification_suppression_ttl: Option<Duration>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            hint_path: default_hint_path(),
            notification_suppression_ttl: None,
        }
    }

    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn hint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.hint_path = path.into();
        self
    }

    pub fn notification_suppression_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.notification_suppression_ttl = ttl;
        self
    }
}

/// `~/.taskauth/session.json`, or relative to the working directory when no
/// home directory is known
pub fn default_hint_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(HINT_DIR).join(HINT_FILE),
        None => PathBuf::from(HINT_DIR).join(HINT_FILE),
    }
}
