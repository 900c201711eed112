use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::MatchingDonor;

#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    #[error("The matching donor directory is unavailable: {0}")]
    Unavailable(String),
    #[error("Matching donor {0} is malformed: {1}")]
    MalformedDonor(String, String),
}

impl From<sqlx::Error> for DirectoryError {
    fn from(e: sqlx::Error) -> Self {
        DirectoryError::Unavailable(e.to_string())
    }
}

/// Read-only access to matching donor definitions.
#[allow(async_fn_in_trait)]
pub trait MatchingDonorDirectory {
    /// The donors that are eligible to match at `now`, in listing order.
    async fn fetch_active_matching_donors(&self, now: DateTime<Utc>) -> Result<Vec<MatchingDonor>, DirectoryError>;

    /// Fetches donors by id, whatever their status. Unknown ids are silently dropped.
    async fn fetch_matching_donors(&self, ids: &[String]) -> Result<Vec<MatchingDonor>, DirectoryError>;
}
