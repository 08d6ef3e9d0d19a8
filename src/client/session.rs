//! Session notification channel
//!
//! One current event slot plus a suppression flag. Repeated failures while a
//! notification is still showing are dropped; `logout` always goes through.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;

/// Why the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    Expired,
    Logout,
    RefreshFailed,
}

impl SessionEventKind {
    pub fn message(self) -> &'static str {
        match self {
            SessionEventKind::Expired => "Your session has expired. Please login again.",
            SessionEventKind::Logout => "You have been logged out successfully.",
            SessionEventKind::RefreshFailed => {
                "Your session could not be restored. Please login again."
            }
        }
    }
}

/// A user-visible session notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub message: String,
}

impl SessionEvent {
    pub fn new(kind: SessionEventKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct NotificationState {
    /// Set while a non-logout event is showing and undismissed
    shown_at: Option<Instant>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<NotificationState>,
    events: watch::Sender<Option<SessionEvent>>,
    suppression_ttl: Option<Duration>,
    published: AtomicUsize,
}

/// Single-slot session notifier. Cloning shares the slot.
#[derive(Debug, Clone)]
pub struct SessionNotifier {
    shared: Arc<Shared>,
}

impl Default for SessionNotifier {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionNotifier {
    /// `suppression_ttl` bounds how long a showing event suppresses the next
    /// one; `None` suppresses until [`clear_notification`](Self::clear_notification).
    pub fn new(suppression_ttl: Option<Duration>) -> Self {
        let (events, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(NotificationState::default()),
                events,
                suppression_ttl,
                published: AtomicUsize::new(0),
            }),
        }
    }

    /// Publish `kind` unless suppressed. Returns whether it was published.
    pub fn notify(&self, kind: SessionEventKind) -> bool {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let suppressing = match (state.shown_at, self.shared.suppression_ttl) {
            (Some(shown_at), Some(ttl)) => shown_at.elapsed() < ttl,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if suppressing && kind != SessionEventKind::Logout {
            tracing::debug!("Suppressing {:?} notification", kind);
            return false;
        }

        state.shown_at = match kind {
            SessionEventKind::Logout => None,
            _ => Some(Instant::now()),
        };
        self.shared
            .events
            .send_replace(Some(SessionEvent::new(kind)));
        self.shared.published.fetch_add(1, Ordering::SeqCst);

        tracing::info!("Session event: {:?}", kind);
        true
    }

    /// Dismiss the current event and re-allow the next one. Also called on
    /// a successful login.
    pub fn clear_notification(&self) {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shown_at = None;
        self.shared.events.send_replace(None);
    }

    pub fn current(&self) -> Option<SessionEvent> {
        self.shared.events.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SessionEvent>> {
        self.shared.events.subscribe()
    }

    /// Number of events published so far (suppressed ones excluded)
    pub fn published_count(&self) -> usize {
        self.shared.published.load(Ordering::SeqCst)
    }
}
