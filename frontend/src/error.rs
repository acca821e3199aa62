use shared::ValidationError;
use thiserror::Error;

/// Shown to the user whenever the server cannot be reached at all
pub const CONNECTIVITY_MESSAGE: &str =
    "Unable to connect to the server. Please check your internet connection.";

pub type Result<T> = std::result::Result<T, ClientError>;

/// Every failure the client layer reports.
///
/// Cloneable so the data state can keep the last error around for display.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// The transport could not reach the server
    #[error("{}", CONNECTIVITY_MESSAGE)]
    Connectivity,

    /// The server answered with a non-success status
    #[error("{message}")]
    Api { status: u16, message: String },

    /// Login or registration was rejected
    #[error("{message}")]
    Auth {
        status: Option<u16>,
        message: String,
    },

    #[error("Not authenticated")]
    NotAuthenticated,

    /// The session ended or changed while the request was in flight; its
    /// result was dropped
    #[error("Session changed before the request completed")]
    SessionChanged,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to encode request: {0}")]
    Encode(String),

    #[error("Unexpected response from server: {0}")]
    Decode(String),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// HTTP status attached to the error, if the server produced one
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Auth { status, .. } => *status,
            _ => None,
        }
    }

    /// Human-readable text for inline display
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Re-label a server rejection as an authentication failure
    pub(crate) fn into_auth(self) -> Self {
        match self {
            ClientError::Api { status, message } => ClientError::Auth {
                status: Some(status),
                message,
            },
            other => other,
        }
    }
}
