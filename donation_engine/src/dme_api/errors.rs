use thiserror::Error;

use crate::{
    helpers::DecryptionError,
    traits::{DirectoryError, DonationStoreError},
};

#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    /// The cause stays out of the message. Telling padding failures apart from bad plaintext would make the endpoint a
    /// padding oracle.
    #[error("Failed to decrypt payload")]
    DecryptionFailed(#[from] DecryptionError),
    #[error("Invalid eventTimestamp: {0}")]
    InvalidEventTimestamp(String),
    #[error("Outdated event. The event is {age_secs}s old, but the limit is {max_age_secs}s.")]
    OutdatedEvent { age_secs: i64, max_age_secs: i64 },
    #[error("Invalid webhook payload. {0}")]
    ValidationError(String),
    #[error("No donation matches {0}")]
    DonationNotFound(String),
    #[error("{0}")]
    StoreError(#[from] DonationStoreError),
}

impl WebhookError {
    /// True for errors caused by the request itself, as opposed to a failure while handling it.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            WebhookError::DecryptionFailed(_)
                | WebhookError::InvalidEventTimestamp(_)
                | WebhookError::OutdatedEvent { .. }
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum MatchingError {
    #[error("Could not read from the donation store. {0}")]
    StoreError(#[from] DonationStoreError),
    #[error("Could not read the matching donor directory. {0}")]
    DirectoryError(#[from] DirectoryError),
}
