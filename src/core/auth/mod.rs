//! Authentication module
//!
//! This module provides the server side of dual-token authentication:
//! - Token authority: access/refresh JWTs with independent keys and lifetimes
//! - Credential verification behind a hasher trait
//! - Login, registration, refresh-with-rotation and logout
//! - REST endpoints and a bearer extractor for protected routes

pub mod api;
pub mod extract;
pub mod jwt;
pub mod password;
pub mod service;

pub use api::{AuthApiState, auth_api_router};
pub use extract::AuthUser;
pub use jwt::{Claims, JwtConfig, JwtError, JwtService, TokenPair, TokenType, Verification};
pub use password::{BcryptHasher, PasswordHasher};
pub use service::{AuthError, AuthService, AuthenticatedAccount, RotationRegistry, SessionTokens};
