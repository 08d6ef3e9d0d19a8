//! Account operations on top of the gateway
//!
//! Login, registration, logout and the silent session restore that runs once
//! when the process starts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::client::config::ClientConfig;
use crate::client::error::ClientError;
use crate::client::gateway::AuthGateway;
use crate::client::session::{SessionEventKind, SessionNotifier};
use crate::client::token::{FileHintStore, HintStore, TokenHolder};
use crate::client::transport::{
    ApiRequest, HttpTransport, LOGIN_PATH, LOGOUT_PATH, REGISTER_PATH, Transport,
};

/// Profile of the signed-in account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
}

#[derive(Deserialize)]
struct LoginBody {
    token: String,
    username: String,
}

/// High-level client for one user session
#[derive(Clone)]
pub struct AccountClient {
    gateway: AuthGateway,
    initialized: Arc<AtomicBool>,
}

impl AccountClient {
    /// reqwest transport and a file-backed username hint, as configured
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(config.base_url.as_str())?;
        Ok(Self::from_parts(
            Arc::new(transport),
            Arc::new(FileHintStore::new(config.hint_path.clone())),
            config,
        ))
    }

    pub fn from_parts(
        transport: Arc<dyn Transport>,
        hints: Arc<dyn HintStore>,
        config: &ClientConfig,
    ) -> Self {
        let gateway = AuthGateway::new(
            transport,
            TokenHolder::new(hints),
            SessionNotifier::new(config.notification_suppression_ttl),
            config.refresh_timeout,
        );
        Self {
            gateway,
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn gateway(&self) -> &AuthGateway {
        &self.gateway
    }

    pub fn notifier(&self) -> &SessionNotifier {
        self.gateway.notifier()
    }

    pub fn tokens(&self) -> &TokenHolder {
        self.gateway.tokens()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens().access_token().is_some()
    }

    /// Username remembered from the last session, if any
    pub fn username(&self) -> Option<String> {
        self.tokens().username_hint()
    }

    /// Restore the session from the refresh cookie.
    ///
    /// Runs at most once per client; only attempted when a username hint
    /// exists. Shares the gateway's refresh, so API calls failing meanwhile
    /// wait for this one. Returns whether a session is active afterwards.
    pub async fn initialize(&self) -> bool {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return self.is_authenticated();
        }

        let Some(username) = self.tokens().username_hint() else {
            tracing::debug!("No previous session to restore");
            return false;
        };

        match self.gateway.refresh(SessionEventKind::RefreshFailed).await {
            Ok(_) => {
                self.notifier().clear_notification();
                tracing::info!("Restored session for user: {}", username);
                true
            }
            Err(e) => {
                tracing::info!("Could not restore session for {}: {}", username, e);
                false
            }
        }
    }

    /// Log in and keep the access token. Returns the canonical username.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ClientError> {
        let response = self
            .gateway
            .send(ApiRequest::post(
                LOGIN_PATH,
                Some(json!({ "username": username, "password": password })),
            ))
            .await?
            .error_for_status()?;

        let body: LoginBody = response.json()?;
        self.tokens()
            .set_access_token(body.token, Some(body.username.as_str()));
        self.notifier().clear_notification();

        tracing::info!("Logged in as {}", body.username);
        Ok(body.username)
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, username: &str, password: &str) -> Result<(), ClientError> {
        self.gateway
            .send(ApiRequest::post(
                REGISTER_PATH,
                Some(json!({ "username": username, "password": password })),
            ))
            .await?
            .error_for_status()?;

        tracing::info!("Registered user: {}", username);
        Ok(())
    }

    /// End the session locally, whatever the server says
    pub async fn logout(&self) {
        match self
            .gateway
            .send(ApiRequest::post(LOGOUT_PATH, None))
            .await
        {
            Ok(response) if !response.is_success() => {
                tracing::warn!("Logout returned {}", response.status);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Logout request failed: {}", e),
        }

        self.tokens().clear();
        self.notifier().notify(SessionEventKind::Logout);
    }

    /// `GET /api/me` through the gateway
    pub async fn current_user(&self) -> Result<CurrentUser, ClientError> {
        self.gateway
            .get("/api/me")
            .await?
            .error_for_status()?
            .json()
    }
}
