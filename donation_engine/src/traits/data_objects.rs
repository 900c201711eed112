use dpg_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::Donation;

/// The outcome of applying a provider event to a donation.
#[derive(Debug, Clone)]
pub enum ApplyEventResult {
    /// The donation was updated and the event recorded, in one transaction.
    Applied(Box<Donation>),
    /// Another delivery of the same `eid` got there first. Nothing was written.
    Duplicate,
}

impl ApplyEventResult {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ApplyEventResult::Duplicate)
    }
}

/// The total matched by one donor on one project, taken from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorMatchTotal {
    pub donor_id: String,
    pub total_matched_amount: Money,
}
