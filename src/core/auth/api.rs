//! Auth API endpoints
//!
//! Provides REST API endpoints for authentication:
//! - POST /auth/register - Register a new user (no tokens issued)
//! - POST /auth/login - Login; access token in the body, refresh token in a cookie
//! - POST /auth/refresh - Rotate the refresh cookie and return a new access token
//! - POST /auth/logout - Clear the refresh cookie
//!
//! The refresh token only ever travels in an HTTP-only cookie scoped to the
//! configured path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};

use crate::core::auth::{AuthError, AuthService};
use crate::core::config::{CookieConfig, SameSitePolicy};

/// When set, `Internal` error details are replaced with a generic message
static HIDE_INTERNAL_ERRORS: AtomicBool = AtomicBool::new(false);

/// Toggle production error rendering
pub fn set_hide_internal_errors(hide: bool) {
    HIDE_INTERNAL_ERRORS.store(hide, Ordering::Relaxed);
}

/// Auth API state
#[derive(Clone)]
pub struct AuthApiState {
    pub auth_service: AuthService,
    pub cookie: CookieConfig,
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub success: bool,
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl ApiError {
    pub fn new(error: impl Into<String>, message: impl Into<String>, status_code: u16) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: message.into(),
            status_code,
        }
    }
}

/// Convert AuthError to API response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match &self {
            AuthError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                if HIDE_INTERNAL_ERRORS.load(Ordering::Relaxed) {
                    "An unexpected error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let body = ApiError::new(self.code(), message, status.as_u16());

        (status, Json(body)).into_response()
    }
}

/// Login / register request body. Fields are optional so that a missing field
/// is reported as a validation failure rather than a deserialization error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Response for a successful login
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
}

/// Response for a successful refresh
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub token: String,
}

/// Generic success response
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Create the auth API router
pub fn auth_api_router(state: AuthApiState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/logout", post(logout_handler))
        .with_state(state)
}

fn same_site(policy: SameSitePolicy) -> SameSite {
    match policy {
        SameSitePolicy::Strict => SameSite::Strict,
        SameSitePolicy::Lax => SameSite::Lax,
        SameSitePolicy::None => SameSite::None,
    }
}

/// Build the refresh cookie carrying `value`
fn refresh_cookie(config: &CookieConfig, value: String) -> Cookie<'static> {
    Cookie::build((config.name.clone(), value))
        .http_only(true)
        .secure(config.secure)
        .same_site(same_site(config.same_site))
        .path(config.path.clone())
        .max_age(time::Duration::seconds(config.max_age_secs))
        .build()
}

/// Build a cookie that clears the refresh cookie on the same path
fn clearing_cookie(config: &CookieConfig) -> Cookie<'static> {
    Cookie::build((config.name.clone(), ""))
        .http_only(true)
        .secure(config.secure)
        .same_site(same_site(config.same_site))
        .path(config.path.clone())
        .max_age(time::Duration::ZERO)
        .build()
}

fn parse_body(
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<CredentialsRequest, AuthError> {
    body.map(|Json(request)| request)
        .map_err(|rejection| AuthError::ValidationFailed(rejection.body_text()))
}

/// POST /auth/register
async fn register_handler(
    State(state): State<Arc<AuthApiState>>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SuccessResponse>), AuthError> {
    let request = parse_body(body)?;

    state
        .auth_service
        .register(request.username.as_deref(), request.password.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::new("Registration successful. Please login.")),
    ))
}

/// POST /auth/login
async fn login_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<LoginResponse>), AuthError> {
    let request = parse_body(body)?;

    let session = state
        .auth_service
        .login(request.username.as_deref(), request.password.as_deref())
        .await?;

    let jar = jar.add(refresh_cookie(&state.cookie, session.tokens.refresh_token));

    Ok((
        jar,
        Json(LoginResponse {
            token: session.tokens.access_token,
            username: session.account.username,
        }),
    ))
}

/// POST /auth/refresh
async fn refresh_handler(State(state): State<Arc<AuthApiState>>, jar: CookieJar) -> Response {
    let presented = jar.get(&state.cookie.name).map(|c| c.value().to_string());
    tracing::debug!("Refresh attempt - cookie present: {}", presented.is_some());

    match state.auth_service.refresh(presented.as_deref()).await {
        Ok(session) => {
            // The new pair exists before the cookie is overwritten
            let jar = jar.add(refresh_cookie(&state.cookie, session.tokens.refresh_token));
            (
                jar,
                Json(RefreshResponse {
                    token: session.tokens.access_token,
                }),
            )
                .into_response()
        }
        Err(err @ AuthError::Unauthenticated(_)) => {
            let jar = jar.add(clearing_cookie(&state.cookie));
            (jar, err).into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// POST /auth/logout
async fn logout_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
) -> (CookieJar, Json<SuccessResponse>) {
    let presented = jar.get(&state.cookie.name).map(|c| c.value().to_string());
    state.auth_service.logout(presented.as_deref());

    let jar = jar.add(clearing_cookie(&state.cookie));
    (jar, Json(SuccessResponse::new("Logged out successfully")))
}
