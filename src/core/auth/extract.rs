//! Bearer authentication for protected routes
//!
//! `AuthUser` is an axum extractor: any handler that takes it requires a valid
//! `Authorization: Bearer <access token>` header and answers 401 otherwise.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};

use crate::core::auth::{AuthError, AuthService, AuthenticatedAccount};

/// Identity of the caller, proven by a valid access token
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthenticatedAccount);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AuthService: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::unauthenticated("Missing bearer token"))?;

        let service = AuthService::from_ref(state);
        let account = service.authenticate(bearer.token())?;

        tracing::trace!("Authenticated request for user: {}", account.username);
        Ok(AuthUser(account))
    }
}
