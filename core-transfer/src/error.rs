use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Remote name conflict for {name}")]
    Conflict { name: String },

    #[error("Remote rejected request (code {code}): {message}")]
    RemoteRejected { code: i64, message: String },

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("IO failure: {0}")]
    IoFailure(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransferError {
    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::NetworkFailure(_))
    }

    /// Short machine-readable kind, used in reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::NotFound(_) => "not_found",
            TransferError::Conflict { .. } => "conflict",
            TransferError::RemoteRejected { .. } => "remote_rejected",
            TransferError::NetworkFailure(_) => "network_failure",
            TransferError::IoFailure(_) => "io_failure",
            TransferError::InvalidStateTransition { .. } => "invalid_state",
            TransferError::Cancelled => "cancelled",
            TransferError::Config(_) => "config",
            TransferError::Internal(_) => "internal",
        }
    }
}

impl From<BridgeError> for TransferError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NotAvailable(msg) => TransferError::Config(msg),
            BridgeError::OperationFailed(msg) => TransferError::NetworkFailure(msg),
            BridgeError::Rejected { code, message } => {
                TransferError::RemoteRejected { code, message }
            }
            BridgeError::NotFound(path) => TransferError::NotFound(path),
            BridgeError::Io(e) => TransferError::IoFailure(e.to_string()),
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            TransferError::NotFound(err.to_string())
        } else {
            TransferError::IoFailure(err.to_string())
        }
    }
}

impl From<core_runtime::Error> for TransferError {
    fn from(err: core_runtime::Error) -> Self {
        TransferError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_mapping() {
        let network: TransferError = BridgeError::OperationFailed("reset".into()).into();
        assert_eq!(network, TransferError::NetworkFailure("reset".into()));
        assert!(network.is_retryable());

        let rejected: TransferError = BridgeError::rejected(403, "forbidden").into();
        assert_eq!(rejected.kind(), "remote_rejected");
        assert!(!rejected.is_retryable());

        let io: TransferError =
            BridgeError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")).into();
        assert!(matches!(io, TransferError::IoFailure(_)));
    }

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err: TransferError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), "not_found");
    }
}
