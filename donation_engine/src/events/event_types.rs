use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db_types::Donation;

/// What caused a matching run to be requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum MatchingTrigger {
    /// A provider webhook was applied (or was a benign no-op)
    Webhook { event_type: String, eid: Option<String> },
    /// The periodic sweep
    Sweep,
    /// An operator asked for a run
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchingRequested {
    pub trigger: MatchingTrigger,
    pub requested_at: DateTime<Utc>,
}

impl MatchingRequested {
    pub fn new(trigger: MatchingTrigger) -> Self {
        Self { trigger, requested_at: Utc::now() }
    }

    pub fn from_webhook(event_type: &str, eid: Option<&str>) -> Self {
        Self::new(MatchingTrigger::Webhook { event_type: event_type.to_string(), eid: eid.map(String::from) })
    }
}

/// Emitted after a provider event has been committed against a donation.
#[derive(Debug, Clone)]
pub struct DonationUpdatedEvent {
    pub event_type: String,
    pub donation: Donation,
}

impl DonationUpdatedEvent {
    pub fn new(event_type: &str, donation: Donation) -> Self {
        Self { event_type: event_type.to_string(), donation }
    }
}
