//! Application router assembly
//!
//! Merges the auth endpoints with the bearer-protected API and applies CORS.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRef, State},
    http::{HeaderValue, Method, header},
    routing::get,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::core::auth::{
    AuthApiState, AuthError, AuthService, AuthUser, BcryptHasher, JwtService, auth_api_router,
};
use crate::core::config::Config;
use crate::core::db::models::AccountResponse;
use crate::core::db::repositories::UserStore;

/// Shared state for protected routes
#[derive(Clone)]
pub struct AppState {
    pub auth_service: AuthService,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        state.auth_service.clone()
    }
}

/// Build the auth service described by `config` on top of `users`
pub fn auth_service_from_config(config: &Config, users: Arc<dyn UserStore>) -> AuthService {
    AuthService::new(
        users,
        Arc::new(BcryptHasher::default()),
        JwtService::new(config.jwt.clone()),
    )
    .with_rotation_enforcement(config.enforce_refresh_rotation)
}

/// Routes that require a valid access token
pub fn protected_router(state: AppState) -> Router {
    Router::new()
        .route("/api/me", get(me_handler))
        .with_state(state)
}

/// GET /api/me
async fn me_handler(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<AccountResponse>, AuthError> {
    let account = state.auth_service.current_account(identity.id).await?;
    Ok(Json(account))
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = match HeaderValue::from_str(origin) {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid CORS_ORIGIN: {}", origin);
            AllowOrigin::list(std::iter::empty())
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the full application router
pub fn build_router(config: &Config, auth_service: AuthService) -> Router {
    crate::core::auth::api::set_hide_internal_errors(config.is_production());

    let auth_api = auth_api_router(AuthApiState {
        auth_service: auth_service.clone(),
        cookie: config.cookie.clone(),
    });

    Router::new()
        .merge(auth_api)
        .merge(protected_router(AppState { auth_service }))
        .layer(cors_layer(&config.cors_origin))
}
