//! Error taxonomy for the storefront client
//!
//! Every mutation and fetch surfaces one of these to its caller. Nothing is
//! swallowed and nothing is retried automatically.

use thiserror::Error;

/// Result alias used across the crate
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// Any 401 from the backend. The whole session is invalid.
    #[error("Your session has expired. Please log in again.")]
    AuthExpired,

    /// A required field is missing or malformed; never sent to the backend
    #[error("{0}")]
    Validation(String),

    /// The backend refused the operation (e.g. no license stock left).
    /// The message is the backend's own, verbatim.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}. Please try again.")]
    Network(String),

    #[error("Server error ({status}). Please try again.")]
    Server { status: u16 },

    /// A cached id no longer resolves (deleted underfoot)
    #[error("{kind} {id} is no longer available")]
    StaleReference { kind: &'static str, id: String },

    /// Moderation attempted on an entity already in a terminal state
    #[error("Cannot change status from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("You can only delete unused keys (license {id} is {status})")]
    NotDeletable { id: String, status: String },

    #[error("Please log in to continue")]
    NotAuthenticated,

    #[error("Admin access required")]
    Forbidden,

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Unexpected response from server: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The client was shut down while the call was outstanding; its result
    /// was dropped without touching any state
    #[error("Client is shutting down")]
    ShutDown,
}

impl StoreError {
    /// Short text suitable for a toast
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// Errors that must force navigation away from protected routes
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }

    /// Raised before any network call was made
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::IllegalTransition { .. }
                | Self::NotDeletable { .. }
                | Self::NotAuthenticated
                | Self::Forbidden
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
