use thiserror::Error;

/// Errors raised while assembling or validating the engine configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed settings document or logging setup failure
    #[error("Configuration error: {0}")]
    Config(String),

    /// A setting holds a value the engine cannot run with
    #[error("Invalid setting `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    /// A required host capability was not provided
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },
}

impl Error {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
