use std::collections::HashMap;

use chrono::{DateTime, Utc};
use donation_engine::{
    db_types::{
        Donation,
        DonationId,
        DonationUpdate,
        MatchingDonationLog,
        MatchingDonor,
        NewDonation,
        NewMatchingLogEntry,
        NewWebhookEvent,
        WebhookEvent,
    },
    traits::{ApplyEventResult, DirectoryError, DonationStore, DonationStoreError, DonorMatchTotal, MatchingDonorDirectory},
};
use dpg_common::Money;
use mockall::mock;

mock! {
    pub DonationDb {}
    impl DonationStore for DonationDb {
        fn url(&self) -> &str;
        async fn insert_donation(&self, donation: NewDonation) -> Result<Donation, DonationStoreError>;
        async fn fetch_donation(&self, id: DonationId) -> Result<Option<Donation>, DonationStoreError>;
        async fn fetch_donation_by_pledge_id(&self, pledge_id: &str) -> Result<Option<Donation>, DonationStoreError>;
        async fn fetch_donation_by_donation_uuid(&self, uuid: &str) -> Result<Option<Donation>, DonationStoreError>;
        async fn update_donation(&self, id: DonationId, update: DonationUpdate) -> Result<Donation, DonationStoreError>;
        async fn apply_donation_event(&self, id: DonationId, update: DonationUpdate, event: NewWebhookEvent) -> Result<ApplyEventResult, DonationStoreError>;
        async fn fetch_unprocessed_donations(&self, min_date: Option<DateTime<Utc>>) -> Result<Vec<Donation>, DonationStoreError>;
        async fn mark_donation_processed(&self, id: DonationId) -> Result<(), DonationStoreError>;
        async fn append_matching_log(&self, entry: NewMatchingLogEntry) -> Result<MatchingDonationLog, DonationStoreError>;
        async fn record_matches(&self, donation_id: DonationId, entries: Vec<NewMatchingLogEntry>) -> Result<Vec<MatchingDonationLog>, DonationStoreError>;
        async fn sum_matched_by_donor(&self, donor_ids: &[String]) -> Result<HashMap<String, Money>, DonationStoreError>;
        async fn matched_totals_for_project(&self, project_slug: &str) -> Result<Vec<DonorMatchTotal>, DonationStoreError>;
        async fn fetch_matching_log_for_donation(&self, donation_id: DonationId) -> Result<Vec<MatchingDonationLog>, DonationStoreError>;
        async fn has_webhook_event(&self, eid: &str) -> Result<bool, DonationStoreError>;
        async fn fetch_webhook_event(&self, eid: &str) -> Result<Option<WebhookEvent>, DonationStoreError>;
        async fn upsert_webhook_event(&self, event: NewWebhookEvent) -> Result<bool, DonationStoreError>;
    }
}

mock! {
    pub DonorDirectory {}
    impl MatchingDonorDirectory for DonorDirectory {
        async fn fetch_active_matching_donors(&self, now: DateTime<Utc>) -> Result<Vec<MatchingDonor>, DirectoryError>;
        async fn fetch_matching_donors(&self, ids: &[String]) -> Result<Vec<MatchingDonor>, DirectoryError>;
    }
}
