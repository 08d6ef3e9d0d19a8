//! Credential store repositories

pub mod user;

pub use user::{InMemoryUserStore, UserStore, UserStoreError};
