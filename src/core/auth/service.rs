//! Authentication service
//!
//! Provides business logic for registration, login, logout, and token refresh.
//! The server keeps no session table: every request is verified against the
//! signing keys alone, plus the optional rotation registry below.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::core::auth::jwt::{JwtError, JwtService, TokenPair, Verification};
use crate::core::auth::password::{HashError, PasswordHasher};
use crate::core::db::models::AccountResponse;
use crate::core::db::repositories::{UserStore, UserStoreError};

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 50;
const MIN_PASSWORD_LEN: usize = 4;

const SESSION_EXPIRED: &str = "Session expired. Please login again.";

/// Authentication error taxonomy
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed input (400)
    #[error("{0}")]
    ValidationFailed(String),

    /// Bad credentials (401)
    #[error("Invalid username or password")]
    AuthFailed,

    /// Missing, invalid or expired token (401)
    #[error("{0}")]
    Unauthenticated(String),

    /// Duplicate username (409)
    #[error("{0}")]
    Conflict(String),

    /// Unexpected failure (500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        AuthError::Unauthenticated(message.into())
    }

    /// HTTP status code for this error
    pub fn status(&self) -> u16 {
        match self {
            AuthError::ValidationFailed(_) => 400,
            AuthError::AuthFailed | AuthError::Unauthenticated(_) => 401,
            AuthError::Conflict(_) => 409,
            AuthError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::ValidationFailed(_) => "VALIDATION_FAILED",
            AuthError::AuthFailed => "AUTH_FAILED",
            AuthError::Unauthenticated(_) => "UNAUTHENTICATED",
            AuthError::Conflict(_) => "CONFLICT",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<UserStoreError> for AuthError {
    fn from(err: UserStoreError) -> Self {
        match err {
            UserStoreError::UsernameAlreadyExists(_) => AuthError::Conflict(err.to_string()),
            UserStoreError::Storage(_) => AuthError::Internal(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<HashError> for AuthError {
    fn from(err: HashError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// Successful login or refresh: a fresh pair plus who it belongs to
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub account: AccountResponse,
    pub tokens: TokenPair,
}

/// Identity proven by a valid access token
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedAccount {
    pub id: Uuid,
    pub username: String,
}

/// Per-subject refresh generation counter.
///
/// A refresh token is accepted only while its generation matches the
/// subject's counter; a successful refresh advances the counter, so the
/// consumed token can never rotate again. Counters live in memory; after a
/// restart a subject's counter is seeded from the first token presented.
#[derive(Debug, Default)]
pub struct RotationRegistry {
    generations: DashMap<Uuid, u64>,
}

impl RotationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, subject: Uuid) -> u64 {
        self.generations
            .get(&subject)
            .map(|g| *g.value())
            .unwrap_or(0)
    }

    /// Move `subject` from `expected` to `expected + 1`; `false` if the
    /// counter had already moved on. An unknown subject starts at `expected`.
    pub fn advance(&self, subject: Uuid, expected: u64) -> bool {
        let mut entry = self.generations.entry(subject).or_insert(expected);
        if *entry != expected {
            return false;
        }
        *entry = expected + 1;
        true
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
    jwt_service: JwtService,
    rotation: Option<Arc<RotationRegistry>>,
}

impl AuthService {
    /// Create a new authentication service with rotation enforcement on
    pub fn new(
        users: Arc<dyn UserStore>,
        hasher: Arc<dyn PasswordHasher>,
        jwt_service: JwtService,
    ) -> Self {
        Self {
            users,
            hasher,
            jwt_service,
            rotation: Some(Arc::new(RotationRegistry::new())),
        }
    }

    /// Toggle the rotation registry. Without it a refresh token stays usable
    /// until its natural expiry.
    pub fn with_rotation_enforcement(mut self, enforce: bool) -> Self {
        self.rotation = enforce.then(|| Arc::new(RotationRegistry::new()));
        self
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt_service
    }

    /// Validate and normalize a username/password pair, returning the trimmed username
    fn validate_credentials(
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<String, AuthError> {
        let username = username.map(str::trim).unwrap_or_default();
        let password = password.unwrap_or_default();

        if username.is_empty() || password.is_empty() {
            return Err(AuthError::ValidationFailed(
                "Username and password are required".to_string(),
            ));
        }

        let len = username.chars().count();
        if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
            return Err(AuthError::ValidationFailed(format!(
                "Username must be between {} and {} characters",
                MIN_USERNAME_LEN, MAX_USERNAME_LEN
            )));
        }

        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::ValidationFailed(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        Ok(username.to_string())
    }

    fn generation_for(&self, subject: Uuid) -> u64 {
        self.rotation
            .as_ref()
            .map(|registry| registry.current(subject))
            .unwrap_or(0)
    }

    /// Verify credentials and issue an access/refresh pair
    pub async fn login(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<SessionTokens, AuthError> {
        let username = Self::validate_credentials(username, password)?;
        let password = password.unwrap_or_default();

        tracing::info!("Login attempt for user: {}", username);

        let Some(account) = self.users.find_by_username(&username).await? else {
            tracing::warn!("Login failed - user not found: {}", username);
            return Err(AuthError::AuthFailed);
        };

        if !self.hasher.verify(password, &account.password_hash)? {
            tracing::warn!("Login failed - invalid password for user: {}", username);
            return Err(AuthError::AuthFailed);
        }

        let tokens = self.jwt_service.issue_pair(
            account.id,
            &account.username,
            self.generation_for(account.id),
        )?;

        tracing::info!("Login successful for user: {}", username);

        Ok(SessionTokens {
            account: account.into(),
            tokens,
        })
    }

    /// Register a new account. No tokens are issued; the caller must log in.
    pub async fn register(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<AccountResponse, AuthError> {
        let username = Self::validate_credentials(username, password)?;
        let password = password.unwrap_or_default();

        tracing::info!("Registration attempt for username: {}", username);

        if self.users.find_by_username(&username).await?.is_some() {
            tracing::warn!(
                "Registration failed - username already exists: {}",
                username
            );
            return Err(AuthError::Conflict(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        let password_hash = self.hasher.hash(password)?;
        let account = self.users.create(&username, &password_hash).await?;

        tracing::info!("User registered successfully: {}", username);

        Ok(account.into())
    }

    /// Exchange a refresh token for a new pair (rotation)
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<SessionTokens, AuthError> {
        let Some(refresh_token) = refresh_token.filter(|t| !t.is_empty()) else {
            tracing::warn!("Refresh attempt without a refresh token");
            return Err(AuthError::unauthenticated(SESSION_EXPIRED));
        };

        let claims = match self.jwt_service.verify_refresh(refresh_token) {
            Verification::Valid(claims) => claims,
            Verification::Expired => {
                tracing::warn!("Refresh failed - refresh token expired");
                return Err(AuthError::unauthenticated(SESSION_EXPIRED));
            }
            Verification::Invalid => {
                tracing::warn!("Refresh failed - invalid refresh token");
                return Err(AuthError::unauthenticated(SESSION_EXPIRED));
            }
        };

        let Some(subject) = claims.subject_id() else {
            tracing::warn!("Refresh failed - malformed subject: {}", claims.sub);
            return Err(AuthError::unauthenticated(SESSION_EXPIRED));
        };

        let Some(account) = self.users.find_by_id(subject).await? else {
            tracing::warn!("Refresh failed - user not found: {}", subject);
            return Err(AuthError::unauthenticated(SESSION_EXPIRED));
        };

        let tokens = match &self.rotation {
            Some(registry) => {
                let Some(generation) = claims.generation else {
                    tracing::warn!("Refresh failed - token carries no generation");
                    return Err(AuthError::unauthenticated(SESSION_EXPIRED));
                };

                // Signing failures leave the generation untouched
                let tokens =
                    self.jwt_service
                        .issue_pair(account.id, &account.username, generation + 1)?;

                if !registry.advance(account.id, generation) {
                    tracing::warn!(
                        "Refresh failed - token already rotated for user: {}",
                        account.username
                    );
                    return Err(AuthError::unauthenticated(SESSION_EXPIRED));
                }
                tokens
            }
            None => self
                .jwt_service
                .issue_pair(account.id, &account.username, 0)?,
        };

        tracing::info!("Token refresh successful for user: {}", account.username);

        Ok(SessionTokens {
            account: account.into(),
            tokens,
        })
    }

    /// Logout. Nothing is invalidated server-side; the caller clears the cookie.
    pub fn logout(&self, refresh_token: Option<&str>) {
        let subject = refresh_token
            .and_then(|t| self.jwt_service.verify_refresh(t).into_claims())
            .map(|claims| claims.username);

        match subject {
            Some(username) => tracing::info!("Logout for user: {}", username),
            None => tracing::info!("Logout without a valid session"),
        }
    }

    /// Verify a bearer access token
    pub fn authenticate(&self, access_token: &str) -> Result<AuthenticatedAccount, AuthError> {
        match self.jwt_service.verify_access(access_token) {
            Verification::Valid(claims) => {
                let id = claims
                    .subject_id()
                    .ok_or_else(|| AuthError::unauthenticated("Invalid access token"))?;
                Ok(AuthenticatedAccount {
                    id,
                    username: claims.username,
                })
            }
            Verification::Expired => Err(AuthError::unauthenticated("Access token expired")),
            Verification::Invalid => Err(AuthError::unauthenticated("Invalid access token")),
        }
    }

    /// Resolve the account behind an authenticated identity
    pub async fn current_account(&self, id: Uuid) -> Result<AccountResponse, AuthError> {
        self.users
            .find_by_id(id)
            .await?
            .map(AccountResponse::from)
            .ok_or_else(|| AuthError::unauthenticated("Account no longer exists"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::jwt::JwtConfig;
    use crate::core::auth::password::BcryptHasher;
    use crate::core::db::repositories::InMemoryUserStore;
    use chrono::Duration;

    fn create_service_with(config: JwtConfig) -> (AuthService, Arc<InMemoryUserStore>) {
        let store = Arc::new(InMemoryUserStore::new());
        let service = AuthService::new(
            store.clone(),
            Arc::new(BcryptHasher::new(4)),
            JwtService::new(config),
        );
        (service, store)
    }

    fn create_service() -> (AuthService, Arc<InMemoryUserStore>) {
        create_service_with(JwtConfig::new("access-test-key", "refresh-test-key"))
    }

    async fn registered(service: &AuthService) {
        service
            .register(Some("alice"), Some("wonder"))
            .await
            .unwrap();
    }

    // ========================================================================
    // Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_credentials_valid() {
        assert_eq!(
            AuthService::validate_credentials(Some("  alice "), Some("wonder")).unwrap(),
            "alice"
        );
        assert!(AuthService::validate_credentials(Some("abc"), Some("1234")).is_ok());
    }

    #[test]
    fn test_validate_credentials_missing() {
        for (user, pass) in [
            (None, Some("wonder")),
            (Some("alice"), None),
            (Some("   "), Some("wonder")),
            (Some("alice"), Some("")),
        ] {
            assert!(matches!(
                AuthService::validate_credentials(user, pass),
                Err(AuthError::ValidationFailed(_))
            ));
        }
    }

    #[test]
    fn test_validate_credentials_lengths() {
        assert!(AuthService::validate_credentials(Some("ab"), Some("wonder")).is_err());
        let long = "a".repeat(51);
        assert!(AuthService::validate_credentials(Some(long.as_str()), Some("wonder")).is_err());
        assert!(AuthService::validate_credentials(Some("alice"), Some("abc")).is_err());
    }

    // ========================================================================
    // Error Tests
    // ========================================================================

    #[test]
    fn test_auth_error_status_and_code() {
        assert_eq!(AuthError::ValidationFailed("x".into()).status(), 400);
        assert_eq!(AuthError::AuthFailed.status(), 401);
        assert_eq!(AuthError::unauthenticated("x").status(), 401);
        assert_eq!(AuthError::Conflict("x".into()).status(), 409);
        assert_eq!(AuthError::Internal("x".into()).status(), 500);
        assert_eq!(AuthError::AuthFailed.code(), "AUTH_FAILED");
        assert_eq!(
            AuthError::AuthFailed.to_string(),
            "Invalid username or password"
        );
    }

    #[test]
    fn test_auth_error_from_store_error() {
        let err: AuthError = UserStoreError::UsernameAlreadyExists("alice".into()).into();
        assert!(matches!(err, AuthError::Conflict(msg) if msg.contains("alice")));

        let err: AuthError = UserStoreError::Storage("down".into()).into();
        assert!(matches!(err, AuthError::Internal(_)));
    }

    #[test]
    fn test_rotation_registry() {
        let registry = RotationRegistry::new();
        let subject = Uuid::new_v4();

        assert_eq!(registry.current(subject), 0);
        assert!(registry.advance(subject, 0));
        assert_eq!(registry.current(subject), 1);
        assert!(!registry.advance(subject, 0));
        assert!(registry.advance(subject, 1));
    }

    #[test]
    fn test_rotation_registry_seeds_unknown_subject() {
        let registry = RotationRegistry::new();
        let subject = Uuid::new_v4();

        assert!(registry.advance(subject, 3));
        assert_eq!(registry.current(subject), 4);
        assert!(!registry.advance(subject, 3));
    }

    // ========================================================================
    // Protocol Tests
    // ========================================================================

    #[tokio::test]
    async fn test_login_token_carries_authenticated_subject() {
        let (service, store) = create_service();
        registered(&service).await;
        let alice = store.find_by_username("alice").await.unwrap().unwrap();

        let session = service.login(Some("alice"), Some("wonder")).await.unwrap();
        assert_eq!(session.account.id, alice.id);

        let identity = service.authenticate(&session.tokens.access_token).unwrap();
        assert_eq!(identity.id, alice.id);
        assert_eq!(identity.username, "alice");
    }

    #[tokio::test]
    async fn test_login_bad_credentials() {
        let (service, _) = create_service();
        registered(&service).await;

        assert!(matches!(
            service.login(Some("alice"), Some("wrong-pw")).await,
            Err(AuthError::AuthFailed)
        ));
        assert!(matches!(
            service.login(Some("nobody"), Some("wonder")).await,
            Err(AuthError::AuthFailed)
        ));
    }

    #[tokio::test]
    async fn test_login_missing_fields() {
        let (service, _) = create_service();

        assert!(matches!(
            service.login(None, Some("wonder")).await,
            Err(AuthError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_register_duplicate_is_conflict() {
        let (service, store) = create_service();
        registered(&service).await;
        let before = store.find_by_username("alice").await.unwrap().unwrap();

        let result = service.register(Some("alice"), Some("pw1234")).await;
        assert!(matches!(result, Err(AuthError::Conflict(_))));

        let after = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(before.password_hash, after.password_hash);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_register_stores_hash_not_password() {
        let (service, store) = create_service();
        registered(&service).await;

        let account = store.find_by_username("alice").await.unwrap().unwrap();
        assert_ne!(account.password_hash, "wonder");
    }

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let (service, _) = create_service();
        registered(&service).await;
        let session = service.login(Some("alice"), Some("wonder")).await.unwrap();

        let refreshed = service
            .refresh(Some(&session.tokens.refresh_token))
            .await
            .unwrap();

        assert_ne!(refreshed.tokens.refresh_token, session.tokens.refresh_token);
        assert_eq!(refreshed.account.id, session.account.id);

        let identity = service
            .authenticate(&refreshed.tokens.access_token)
            .unwrap();
        assert_eq!(identity.id, session.account.id);
    }

    #[tokio::test]
    async fn test_refresh_rejects_consumed_token() {
        let (service, _) = create_service();
        registered(&service).await;
        let session = service.login(Some("alice"), Some("wonder")).await.unwrap();

        let rotated = service
            .refresh(Some(&session.tokens.refresh_token))
            .await
            .unwrap();

        assert!(matches!(
            service.refresh(Some(&session.tokens.refresh_token)).await,
            Err(AuthError::Unauthenticated(_))
        ));
        assert!(
            service
                .refresh(Some(&rotated.tokens.refresh_token))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_refresh_survives_restart() {
        let config = JwtConfig::new("access-test-key", "refresh-test-key");
        let (service, store) = create_service_with(config.clone());
        registered(&service).await;
        let session = service.login(Some("alice"), Some("wonder")).await.unwrap();
        let rotated = service
            .refresh(Some(&session.tokens.refresh_token))
            .await
            .unwrap();

        // Same store and keys, empty rotation state
        let restarted = AuthService::new(
            store,
            Arc::new(BcryptHasher::new(4)),
            JwtService::new(config),
        );

        let after_restart = restarted
            .refresh(Some(&rotated.tokens.refresh_token))
            .await
            .unwrap();
        assert_eq!(after_restart.account.id, session.account.id);

        assert!(matches!(
            restarted.refresh(Some(&rotated.tokens.refresh_token)).await,
            Err(AuthError::Unauthenticated(_))
        ));
        assert!(
            restarted
                .refresh(Some(&after_restart.tokens.refresh_token))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_refresh_without_rotation_enforcement_is_stateless() {
        let (service, _) = create_service();
        let service = service.with_rotation_enforcement(false);
        registered(&service).await;
        let session = service.login(Some("alice"), Some("wonder")).await.unwrap();

        let first = service
            .refresh(Some(&session.tokens.refresh_token))
            .await
            .unwrap();
        let replay = service
            .refresh(Some(&session.tokens.refresh_token))
            .await
            .unwrap();

        assert_ne!(first.tokens.refresh_token, session.tokens.refresh_token);
        assert_ne!(replay.tokens.refresh_token, first.tokens.refresh_token);
    }

    #[tokio::test]
    async fn test_refresh_absent_or_invalid() {
        let (service, _) = create_service();

        for token in [None, Some(""), Some("garbage")] {
            assert!(matches!(
                service.refresh(token).await,
                Err(AuthError::Unauthenticated(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let (service, _) = create_service();
        registered(&service).await;
        let session = service.login(Some("alice"), Some("wonder")).await.unwrap();

        assert!(matches!(
            service.refresh(Some(&session.tokens.access_token)).await,
            Err(AuthError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_expired() {
        let (service, _) = create_service_with(
            JwtConfig::new("a", "r")
                .access_ttl(Duration::seconds(-20))
                .refresh_ttl(Duration::seconds(-10)),
        );
        registered(&service).await;
        let session = service.login(Some("alice"), Some("wonder")).await.unwrap();

        assert!(matches!(
            service.refresh(Some(&session.tokens.refresh_token)).await,
            Err(AuthError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_for_deleted_account() {
        let (service, store) = create_service();
        registered(&service).await;
        let session = service.login(Some("alice"), Some("wonder")).await.unwrap();

        store.remove(session.account.id);

        assert!(matches!(
            service.refresh(Some(&session.tokens.refresh_token)).await,
            Err(AuthError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_refresh_and_expired() {
        let (service, _) = create_service_with(
            JwtConfig::new("a", "r").access_ttl(Duration::seconds(-10)),
        );
        registered(&service).await;
        let session = service.login(Some("alice"), Some("wonder")).await.unwrap();

        assert!(matches!(
            service.authenticate(&session.tokens.access_token),
            Err(AuthError::Unauthenticated(msg)) if msg == "Access token expired"
        ));
        assert!(matches!(
            service.authenticate(&session.tokens.refresh_token),
            Err(AuthError::Unauthenticated(msg)) if msg == "Invalid access token"
        ));
    }

    #[tokio::test]
    async fn test_logout_never_fails() {
        let (service, _) = create_service();
        service.logout(None);
        service.logout(Some("garbage"));
    }
}
