use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    /// Transport-level failure (connection reset, timeout, TLS).
    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The remote side answered, but with a non-success status.
    #[error("Remote rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn rejected(code: i64, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
