//! Error types for the 123pan provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// 123pan provider errors
#[derive(Error, Debug)]
pub enum PanError {
    /// The API answered with a non-zero envelope code
    #[error("123pan API error (code {code}): {message}")]
    ApiError { code: i64, message: String },

    /// Non-2xx HTTP status
    #[error("HTTP error (status {status}): {message}")]
    HttpError { status: u16, message: String },

    /// Listing throttled and the retry budget is spent
    #[error("Rate limited, gave up after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// A same-named object already exists
    #[error("Name already exists: {0}")]
    NameConflict(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// A field the protocol requires was absent
    #[error("Missing field in API response: {0}")]
    MissingField(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for 123pan operations
pub type Result<T> = std::result::Result<T, PanError>;

impl From<PanError> for BridgeError {
    fn from(error: PanError) -> Self {
        match error {
            PanError::ApiError { code, message } => BridgeError::Rejected { code, message },
            PanError::HttpError { status, message } => {
                if status == 429 || (500..600).contains(&status) {
                    BridgeError::OperationFailed(format!("HTTP {}: {}", status, message))
                } else if status == 404 {
                    BridgeError::NotFound(message)
                } else {
                    BridgeError::Rejected {
                        code: i64::from(status),
                        message,
                    }
                }
            }
            PanError::RateLimited { attempts } => BridgeError::OperationFailed(format!(
                "Rate limited after {} attempts",
                attempts
            )),
            PanError::NameConflict(name) => BridgeError::Rejected {
                code: crate::connector::CONFLICT_CODE,
                message: format!("Name already exists: {}", name),
            },
            PanError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            PanError::MissingField(field) => {
                BridgeError::OperationFailed(format!("Missing field: {}", field))
            }
            PanError::BridgeError(e) => e,
        }
    }
}
