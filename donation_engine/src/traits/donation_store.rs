use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dpg_common::Money;
use thiserror::Error;

use crate::{
    db_types::{
        Donation,
        DonationId,
        DonationUpdate,
        MatchingDonationLog,
        NewDonation,
        NewMatchingLogEntry,
        NewWebhookEvent,
        WebhookEvent,
    },
    traits::{ApplyEventResult, DonorMatchTotal},
};

#[derive(Debug, Clone, Error)]
pub enum DonationStoreError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Cannot insert donation, since one already exists with the same external id: {0}")]
    DonationAlreadyExists(String),
    #[error("The requested donation (internal id {0}) does not exist")]
    DonationNotFound(DonationId),
    #[error("The requested donation change would result in a no-op.")]
    DonationModificationNoOp,
    #[error("Donation {0} has already been processed by the matching engine")]
    DonationAlreadyProcessed(DonationId),
    #[error("Stored data is inconsistent. {0}")]
    DataIntegrityError(String),
}

impl From<sqlx::Error> for DonationStoreError {
    fn from(e: sqlx::Error) -> Self {
        DonationStoreError::DatabaseError(e.to_string())
    }
}

/// The `DonationStore` trait defines the persistence behaviour the webhook reconciler and the matching engine rely on.
///
/// Implementations must guarantee two atomic compound operations:
/// * [`apply_donation_event`](DonationStore::apply_donation_event) updates a donation and records the webhook event
///   that caused the update, or does neither.
/// * [`record_matches`](DonationStore::record_matches) appends a donation's ledger entries and marks it processed, or
///   does neither.
///
/// Everything else is a single-row read or write.
#[allow(async_fn_in_trait)]
pub trait DonationStore {
    /// The URL of the backing store, for logging.
    fn url(&self) -> &str;

    /// Creates a donation record. Donations are created at pledge time by an outside flow; this exists so that the
    /// store can be seeded and tested.
    async fn insert_donation(&self, donation: NewDonation) -> Result<Donation, DonationStoreError>;

    async fn fetch_donation(&self, id: DonationId) -> Result<Option<Donation>, DonationStoreError>;

    async fn fetch_donation_by_pledge_id(&self, pledge_id: &str) -> Result<Option<Donation>, DonationStoreError>;

    async fn fetch_donation_by_donation_uuid(&self, uuid: &str) -> Result<Option<Donation>, DonationStoreError>;

    /// Writes the non-empty fields of `update` to the donation and returns the updated record.
    ///
    /// Returns [`DonationStoreError::DonationModificationNoOp`] for an empty update.
    async fn update_donation(&self, id: DonationId, update: DonationUpdate) -> Result<Donation, DonationStoreError>;

    /// In a single transaction, records `event` (insert-if-absent on its `eid`) and, if it was not already present,
    /// applies `update` to the donation.
    async fn apply_donation_event(
        &self,
        id: DonationId,
        update: DonationUpdate,
        event: NewWebhookEvent,
    ) -> Result<ApplyEventResult, DonationStoreError>;

    /// Donations that the matching engine has not yet processed, oldest first (ties broken by id). If `min_date` is
    /// given, donations created before it are excluded.
    async fn fetch_unprocessed_donations(
        &self,
        min_date: Option<DateTime<Utc>>,
    ) -> Result<Vec<Donation>, DonationStoreError>;

    /// Sets `processed`. A donation that is already processed is left as is.
    async fn mark_donation_processed(&self, id: DonationId) -> Result<(), DonationStoreError>;

    async fn append_matching_log(&self, entry: NewMatchingLogEntry) -> Result<MatchingDonationLog, DonationStoreError>;

    /// In a single transaction, appends every entry in `entries` to the ledger and marks the donation processed.
    ///
    /// Fails with [`DonationStoreError::DonationAlreadyProcessed`] (writing nothing) if the donation was processed in
    /// the meantime.
    async fn record_matches(
        &self,
        donation_id: DonationId,
        entries: Vec<NewMatchingLogEntry>,
    ) -> Result<Vec<MatchingDonationLog>, DonationStoreError>;

    /// The ledger total for each of the given donors. Donors without ledger entries are absent from the map.
    async fn sum_matched_by_donor(&self, donor_ids: &[String]) -> Result<HashMap<String, Money>, DonationStoreError>;

    /// Ledger totals per donor for one project, largest first.
    async fn matched_totals_for_project(&self, project_slug: &str) -> Result<Vec<DonorMatchTotal>, DonationStoreError>;

    async fn fetch_matching_log_for_donation(
        &self,
        donation_id: DonationId,
    ) -> Result<Vec<MatchingDonationLog>, DonationStoreError>;

    async fn has_webhook_event(&self, eid: &str) -> Result<bool, DonationStoreError>;

    async fn fetch_webhook_event(&self, eid: &str) -> Result<Option<WebhookEvent>, DonationStoreError>;

    /// Records the event unless its `eid` is already present. Returns `true` if a new record was written.
    async fn upsert_webhook_event(&self, event: NewWebhookEvent) -> Result<bool, DonationStoreError>;
}
