//! Client side of the session protocol
//!
//! [`AccountClient`] is the entry point. Every API call goes through the
//! [`AuthGateway`], which attaches the access token and coordinates refresh.

pub mod account;
pub mod config;
pub mod error;
pub mod gateway;
pub mod session;
pub mod token;
pub mod transport;

#[cfg(all(test, feature = "ssr"))]
mod tests;

pub use account::{AccountClient, CurrentUser};
pub use config::ClientConfig;
pub use error::ClientError;
pub use gateway::AuthGateway;
pub use session::{SessionEvent, SessionEventKind, SessionNotifier};
pub use token::{FileHintStore, HintStore, MemoryHintStore, TokenHolder};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
