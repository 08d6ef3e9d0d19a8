//! Client auth gateway
//!
//! Attaches the access token to every API request and turns a 401 into a
//! single coordinated refresh. Requests that fail while a refresh is in
//! flight queue up behind it and are resumed with the same new token, or all
//! failed together if the refresh fails.
//!
//! The coordination state and the FIFO queue sit behind one mutex. The
//! refresh itself runs on its own task so a caller that gives up does not
//! strand the requests queued behind it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::client::error::ClientError;
use crate::client::session::{SessionEventKind, SessionNotifier};
use crate::client::token::TokenHolder;
use crate::client::transport::{
    ApiRequest, ApiResponse, REFRESH_PATH, Transport, is_auth_endpoint,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshState {
    Idle,
    Refreshing,
}

/// Result of one refresh, shared with every queued request
#[derive(Debug, Clone)]
enum RefreshOutcome {
    Refreshed(String),
    Failed,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<RefreshOutcome>,
}

struct Coordination {
    state: RefreshState,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
}

struct Inner {
    transport: Arc<dyn Transport>,
    tokens: TokenHolder,
    notifier: SessionNotifier,
    refresh_timeout: Duration,
    coordination: Mutex<Coordination>,
}

#[derive(Deserialize)]
struct RefreshBody {
    token: String,
}

/// Ask the server for a new access token using the refresh cookie
async fn request_refresh(transport: &dyn Transport) -> Result<String, ClientError> {
    let response = transport
        .send(ApiRequest::post(REFRESH_PATH, None))
        .await?
        .error_for_status()?;
    Ok(response.json::<RefreshBody>()?.token)
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Coordination> {
        self.coordination
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_refresh(self: Arc<Self>, on_failure: SessionEventKind) -> RefreshOutcome {
        tracing::debug!("Refreshing access token");

        let outcome = match tokio::time::timeout(
            self.refresh_timeout,
            request_refresh(self.transport.as_ref()),
        )
        .await
        {
            Ok(Ok(token)) => RefreshOutcome::Refreshed(token),
            Ok(Err(e)) => {
                tracing::warn!("Token refresh failed: {}", e);
                RefreshOutcome::Failed
            }
            Err(_) => {
                tracing::warn!("Token refresh timed out after {:?}", self.refresh_timeout);
                RefreshOutcome::Failed
            }
        };

        self.complete_refresh(&outcome, on_failure);
        outcome
    }

    /// Publish the outcome: update the token, go idle, then release the queue
    /// in arrival order.
    fn complete_refresh(&self, outcome: &RefreshOutcome, on_failure: SessionEventKind) {
        let waiters = {
            let mut coordination = self.lock();
            match outcome {
                RefreshOutcome::Refreshed(token) => {
                    self.tokens.set_access_token(token.as_str(), None)
                }
                RefreshOutcome::Failed => self.tokens.clear(),
            }
            coordination.state = RefreshState::Idle;
            std::mem::take(&mut coordination.waiters)
        };

        match outcome {
            RefreshOutcome::Refreshed(_) => {
                tracing::info!(
                    "Access token refreshed, resuming {} queued requests",
                    waiters.len()
                );
            }
            RefreshOutcome::Failed => {
                tracing::info!("Session ended, failing {} queued requests", waiters.len());
                self.notifier.notify(on_failure);
            }
        }

        for waiter in waiters {
            // A closed receiver means the caller already gave up
            let _ = waiter.tx.send(outcome.clone());
        }
    }
}

/// Removes a queued request when its caller stops waiting
struct WaiterGuard<'a> {
    inner: &'a Inner,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        let mut coordination = self.inner.lock();
        coordination.waiters.retain(|waiter| waiter.id != self.id);
    }
}

enum Role {
    Leader,
    Waiter(u64, oneshot::Receiver<RefreshOutcome>),
    /// Someone else already refreshed after this request's token was read
    Ready(String),
}

/// Token-attaching, refresh-coordinating front for API calls.
///
/// Cloning shares the token, queue and notifier.
#[derive(Clone)]
pub struct AuthGateway {
    inner: Arc<Inner>,
}

impl AuthGateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: TokenHolder,
        notifier: SessionNotifier,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                tokens,
                notifier,
                refresh_timeout,
                coordination: Mutex::new(Coordination {
                    state: RefreshState::Idle,
                    waiters: VecDeque::new(),
                    next_waiter_id: 0,
                }),
            }),
        }
    }

    pub fn tokens(&self) -> &TokenHolder {
        &self.inner.tokens
    }

    pub fn notifier(&self) -> &SessionNotifier {
        &self.inner.notifier
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.lock().state == RefreshState::Refreshing
    }

    /// Requests currently waiting on the in-flight refresh
    pub fn queued(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<ApiResponse, ClientError> {
        self.send(ApiRequest::post(path, body)).await
    }

    /// Send `request` with the current access token.
    ///
    /// A 401 triggers (or joins) a refresh and one retry with the new token.
    /// A retry that is rejected again ends the session. Any other status and
    /// transport errors are returned untouched. Session endpoints bypass all
    /// of this.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ClientError> {
        if is_auth_endpoint(&request.path) {
            return self.inner.transport.send(request).await;
        }

        request.bearer = self.inner.tokens.access_token();
        let response = self.inner.transport.send(request.clone()).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        tracing::debug!("{} {} unauthorized", request.method, request.path);
        let token = self
            .coordinate(Some(request.bearer.as_deref()), SessionEventKind::Expired)
            .await?;

        request.bearer = Some(token);
        let response = self.inner.transport.send(request).await?;
        if response.is_unauthorized() {
            tracing::warn!("Refreshed token rejected, ending session");
            self.inner.tokens.clear();
            self.inner.notifier.notify(SessionEventKind::Expired);
            return Err(ClientError::AuthenticationFailed);
        }
        Ok(response)
    }

    /// Obtain a new access token, joining any refresh already in flight.
    ///
    /// When this call leads the refresh and it fails, `on_failure` is the
    /// event published.
    pub(crate) async fn refresh(&self, on_failure: SessionEventKind) -> Result<String, ClientError> {
        self.coordinate(None, on_failure).await
    }

    /// Lead or join the refresh. With `rejected` set (the token that just got
    /// a 401), a token that changed since then is returned without refreshing.
    async fn coordinate(
        &self,
        rejected: Option<Option<&str>>,
        on_failure: SessionEventKind,
    ) -> Result<String, ClientError> {
        let role = {
            let mut coordination = self.inner.lock();
            match coordination.state {
                RefreshState::Refreshing => {
                    let (tx, rx) = oneshot::channel();
                    let id = coordination.next_waiter_id;
                    coordination.next_waiter_id += 1;
                    coordination.waiters.push_back(Waiter { id, tx });
                    tracing::debug!(
                        "Queued behind refresh ({} waiting)",
                        coordination.waiters.len()
                    );
                    Role::Waiter(id, rx)
                }
                RefreshState::Idle => match (self.inner.tokens.access_token(), rejected) {
                    (Some(current), Some(rejected)) if Some(current.as_str()) != rejected => {
                        Role::Ready(current)
                    }
                    _ => {
                        coordination.state = RefreshState::Refreshing;
                        Role::Leader
                    }
                },
            }
        };

        let outcome = match role {
            Role::Ready(token) => return Ok(token),
            Role::Leader => {
                let handle = tokio::spawn(self.inner.clone().run_refresh(on_failure));
                match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        // The task only ends early if it panicked; the queue
                        // must still be released
                        tracing::error!("Refresh task failed: {}", e);
                        self.inner
                            .complete_refresh(&RefreshOutcome::Failed, on_failure);
                        RefreshOutcome::Failed
                    }
                }
            }
            Role::Waiter(id, rx) => {
                let _guard = WaiterGuard {
                    inner: &self.inner,
                    id,
                };
                rx.await.unwrap_or(RefreshOutcome::Failed)
            }
        };

        match outcome {
            RefreshOutcome::Refreshed(token) => Ok(token),
            RefreshOutcome::Failed => Err(ClientError::AuthenticationFailed),
        }
    }
}
