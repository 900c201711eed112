//! `SqliteDatabase` is a concrete implementation of a donation engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`traits`] module.
//!
//! [`traits`]: crate::traits
use std::{collections::HashMap, fmt::Debug};

use chrono::{DateTime, Utc};
use dpg_common::Money;
use log::*;
use sqlx::{migrate::Migrator, SqlitePool};

use super::db::{db_url, donations, matching_donors, matching_log, new_pool, webhook_events};
use crate::{
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
    traits::{
        ApplyEventResult,
        DirectoryError,
        DonationStore,
        DonationStoreError,
        DonorMatchTotal,
        MatchingDonorDirectory,
    },
};

static MIGRATOR: Migrator = sqlx::migrate!("./src/sqlite/migrations");

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl DonationStore for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_donation(&self, donation: NewDonation) -> Result<Donation, DonationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let donation = donations::insert_donation(donation, &mut conn).await?;
        debug!("🗃️ Donation #{} for project {} has been saved", donation.id, donation.project_slug);
        Ok(donation)
    }

    async fn fetch_donation(&self, id: DonationId) -> Result<Option<Donation>, DonationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let donation = donations::fetch_donation(id, &mut conn).await?;
        Ok(donation)
    }

    async fn fetch_donation_by_pledge_id(&self, pledge_id: &str) -> Result<Option<Donation>, DonationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let donation = donations::fetch_donation_by_pledge_id(pledge_id, &mut conn).await?;
        Ok(donation)
    }

    async fn fetch_donation_by_donation_uuid(&self, uuid: &str) -> Result<Option<Donation>, DonationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let donation = donations::fetch_donation_by_donation_uuid(uuid, &mut conn).await?;
        Ok(donation)
    }

    async fn update_donation(&self, id: DonationId, update: DonationUpdate) -> Result<Donation, DonationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let donation =
            donations::update_donation(id, update, &mut conn).await?.ok_or(DonationStoreError::DonationNotFound(id))?;
        Ok(donation)
    }

    /// The event record is inserted first. If the `eid` is already present the transaction is rolled back without
    /// touching the donation, so a concurrent duplicate delivery cannot apply the same update twice.
    async fn apply_donation_event(
        &self,
        id: DonationId,
        update: DonationUpdate,
        event: NewWebhookEvent,
    ) -> Result<ApplyEventResult, DonationStoreError> {
        let mut tx = self.pool.begin().await?;
        let eid = event.eid.clone();
        if !webhook_events::insert_if_absent(event, &mut tx).await? {
            debug!("🗃️ Webhook event {eid} has already been recorded. Donation #{id} is left unchanged.");
            tx.rollback().await?;
            return Ok(ApplyEventResult::Duplicate);
        }
        let donation =
            donations::update_donation(id, update, &mut tx).await?.ok_or(DonationStoreError::DonationNotFound(id))?;
        tx.commit().await?;
        debug!("🗃️ Donation #{id} updated from webhook event {eid}");
        Ok(ApplyEventResult::Applied(Box::new(donation)))
    }

    async fn fetch_unprocessed_donations(
        &self,
        min_date: Option<DateTime<Utc>>,
    ) -> Result<Vec<Donation>, DonationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = donations::fetch_unprocessed_donations(min_date, &mut conn).await?;
        Ok(result)
    }

    async fn mark_donation_processed(&self, id: DonationId) -> Result<(), DonationStoreError> {
        let mut conn = self.pool.acquire().await?;
        if !donations::mark_processed(id, &mut conn).await? {
            trace!("🗃️ Donation #{id} was already processed");
        }
        Ok(())
    }

    async fn append_matching_log(&self, entry: NewMatchingLogEntry) -> Result<MatchingDonationLog, DonationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let row = matching_log::append_entry(entry, &mut conn).await?;
        Ok(row)
    }

    async fn record_matches(
        &self,
        donation_id: DonationId,
        entries: Vec<NewMatchingLogEntry>,
    ) -> Result<Vec<MatchingDonationLog>, DonationStoreError> {
        let mut tx = self.pool.begin().await?;
        if !donations::mark_processed(donation_id, &mut tx).await? {
            let exists = donations::fetch_donation(donation_id, &mut tx).await?.is_some();
            tx.rollback().await?;
            return match exists {
                true => Err(DonationStoreError::DonationAlreadyProcessed(donation_id)),
                false => Err(DonationStoreError::DonationNotFound(donation_id)),
            };
        }
        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.donation_id != donation_id {
                return Err(DonationStoreError::DataIntegrityError(format!(
                    "Ledger entry for donation {} cannot be recorded against donation {donation_id}",
                    entry.donation_id
                )));
            }
            rows.push(matching_log::append_entry(entry, &mut tx).await?);
        }
        tx.commit().await?;
        trace!("🗃️ Donation #{donation_id} processed with {} ledger entries", rows.len());
        Ok(rows)
    }

    async fn sum_matched_by_donor(&self, donor_ids: &[String]) -> Result<HashMap<String, Money>, DonationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let totals = matching_log::sum_by_donor(donor_ids, &mut conn).await?;
        Ok(totals)
    }

    async fn matched_totals_for_project(&self, project_slug: &str) -> Result<Vec<DonorMatchTotal>, DonationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let totals = matching_log::totals_for_project(project_slug, &mut conn)
            .await?
            .into_iter()
            .map(|(donor_id, total_matched_amount)| DonorMatchTotal { donor_id, total_matched_amount })
            .collect();
        Ok(totals)
    }

    async fn fetch_matching_log_for_donation(
        &self,
        donation_id: DonationId,
    ) -> Result<Vec<MatchingDonationLog>, DonationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let rows = matching_log::entries_for_donation(donation_id, &mut conn).await?;
        Ok(rows)
    }

    async fn has_webhook_event(&self, eid: &str) -> Result<bool, DonationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let exists = webhook_events::exists(eid, &mut conn).await?;
        Ok(exists)
    }

    async fn fetch_webhook_event(&self, eid: &str) -> Result<Option<WebhookEvent>, DonationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let event = webhook_events::fetch_by_eid(eid, &mut conn).await?;
        Ok(event)
    }

    async fn upsert_webhook_event(&self, event: NewWebhookEvent) -> Result<bool, DonationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let inserted = webhook_events::insert_if_absent(event, &mut conn).await?;
        Ok(inserted)
    }
}

impl MatchingDonorDirectory for SqliteDatabase {
    async fn fetch_active_matching_donors(&self, now: DateTime<Utc>) -> Result<Vec<MatchingDonor>, DirectoryError> {
        let mut conn = self.pool.acquire().await?;
        let donors = matching_donors::fetch_active(now, &mut conn).await?;
        Ok(donors)
    }

    async fn fetch_matching_donors(&self, ids: &[String]) -> Result<Vec<MatchingDonor>, DirectoryError> {
        let mut conn = self.pool.acquire().await?;
        let donors = matching_donors::fetch_by_ids(ids, &mut conn).await?;
        Ok(donors)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date with the migrations embedded in this crate.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Replaces the matching donor directory with `donors`, keeping their order as the listing order.
    ///
    /// Donors that are not in `donors` are left in place; mark them inactive to retire them.
    pub async fn sync_matching_donors(&self, donors: &[MatchingDonor]) -> Result<(), DirectoryError> {
        for donor in donors {
            validate_donor(donor)?;
        }
        let mut tx = self.pool.begin().await?;
        for (i, donor) in donors.iter().enumerate() {
            matching_donors::upsert(donor, i as i64, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ {} matching donors synchronised", donors.len());
        Ok(())
    }
}

fn validate_donor(donor: &MatchingDonor) -> Result<(), DirectoryError> {
    let malformed = |reason: &str| Err(DirectoryError::MalformedDonor(donor.id.clone(), reason.to_string()));
    if donor.id.trim().is_empty() {
        return malformed("the id is empty");
    }
    if donor.multiplier.is_sign_negative() {
        return malformed("the multiplier is negative");
    }
    if donor.total_matching_amount.value().is_sign_negative() {
        return malformed("the matching budget is negative");
    }
    if donor.end_date < donor.start_date {
        return malformed("the matching period ends before it starts");
    }
    Ok(())
}
