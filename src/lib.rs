//! taskauth - Dual-token authentication with coordinated client refresh
//!
//! The `core` module (feature `ssr`) is the axum server that issues short-lived
//! access tokens and rotates refresh tokens held in an HTTP-only cookie.
//! The `client` module (feature `client`) is the consumer side: it attaches the
//! access token to API calls and runs a single refresh for any number of
//! concurrent requests that hit 401.

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "ssr")]
pub mod core;
