use thiserror::Error;

use crate::admission::DenyReason;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("invalid engine input: {message}")]
    Configuration { message: String },
    #[error("actor is inactive")]
    ActorInactive,
    #[error("daily quota exceeded ({scope})")]
    QuotaExceeded { scope: DenyReason },
    #[error("sub-account allowance reached: limit={limit}")]
    SponsorLimitReached { limit: u64 },
    #[error("store unavailable: {message}")]
    Store { message: String },
}

impl QuotaError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        QuotaError::Configuration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QuotaError>;
