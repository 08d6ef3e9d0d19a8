//! Credential store
//!
//! Account entities and the store abstraction the auth service consumes.
//! Storage technology stays behind [`UserStore`].

pub mod models;
pub mod repositories;

pub use models::*;
pub use repositories::{InMemoryUserStore, UserStore, UserStoreError};
