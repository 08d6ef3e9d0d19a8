//! Client-side error types

/// Errors surfaced to callers of the client
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// The session could not be (re)established; the caller must log in again
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ClientError {
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, ClientError::AuthenticationFailed)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}
