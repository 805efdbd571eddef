use cumulus_transfer::{RemoteError, TransferError};

/// Errors returned by the client crate.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server error {status}/{reason}: {message}")]
    Server {
        status: i32,
        reason: i32,
        message: String,
    },

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<RemoteError> for ClientError {
    fn from(err: RemoteError) -> Self {
        Self::Server {
            status: err.status_code,
            reason: err.reason_code,
            message: err.message,
        }
    }
}
