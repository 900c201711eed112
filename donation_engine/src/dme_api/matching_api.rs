use std::{collections::HashMap, fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use dpg_common::Money;
use log::*;
use tokio::sync::Mutex;

use crate::{
    db_types::{MatchingDonor, NewMatchingLogEntry},
    dme_api::{
        allocation::{order_donors, plan_matches, BudgetBook},
        errors::MatchingError,
        matching_objects::{DonorOrdering, MatchingOptions, MatchingResult, ProjectMatchSummary},
    },
    traits::{DonationStore, MatchingDonorDirectory},
};

const UNKNOWN_DONOR: &str = "Unknown Donor";

/// `MatchingApi` distributes matching donor budgets over the donations that have not been matched yet.
///
/// A run reads every unprocessed donation (oldest first) and takes a snapshot of the eligible donors and of their
/// consumed budgets. Each donation with a positive USD value is then offered to the donors that support its project,
/// in [`DonorOrdering`] order, until either the donation is fully matched or the donors run out of budget. The ledger
/// entries for a donation and its `processed` flag are written together.
///
/// Runs are serialized. Every clone of a `MatchingApi` shares one run lock, so concurrent triggers queue up and each
/// run sees the ledger as the previous run left it.
pub struct MatchingApi<B, D> {
    db: B,
    directory: D,
    ordering: DonorOrdering,
    run_lock: Arc<Mutex<()>>,
}

impl<B: Clone, D: Clone> Clone for MatchingApi<B, D> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            directory: self.directory.clone(),
            ordering: self.ordering,
            run_lock: Arc::clone(&self.run_lock),
        }
    }
}

impl<B, D> Debug for MatchingApi<B, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MatchingApi (ordering: {})", self.ordering)
    }
}

impl<B, D> MatchingApi<B, D> {
    pub fn new(db: B, directory: D) -> Self {
        Self { db, directory, ordering: DonorOrdering::default(), run_lock: Arc::new(Mutex::new(())) }
    }

    pub fn with_ordering(mut self, ordering: DonorOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn ordering(&self) -> DonorOrdering {
        self.ordering
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, D> MatchingApi<B, D>
where
    B: DonationStore,
    D: MatchingDonorDirectory,
{
    pub async fn run(&self, options: MatchingOptions) -> Result<MatchingResult, MatchingError> {
        self.run_at(options, Utc::now()).await
    }

    /// Runs the matching engine with `now` as the time donor eligibility is evaluated at and ledger entries are dated.
    ///
    /// Only failures to read the donation list, the directory or the ledger fail the run. A failure while writing a
    /// single donation's matches is reported in [`MatchingResult::errors`] and the run carries on.
    pub async fn run_at(&self, options: MatchingOptions, now: DateTime<Utc>) -> Result<MatchingResult, MatchingError> {
        let _guard = self.run_lock.lock().await;
        let mode = if options.dry_run { "dry run" } else { "run" };
        debug!("⚖️ Matching {mode} started");
        let donations = self.db.fetch_unprocessed_donations(options.min_date).await?;
        if donations.is_empty() {
            debug!("⚖️ No unprocessed donations. Nothing to do.");
            return Ok(MatchingResult::default());
        }
        let mut result = MatchingResult { processed: donations.len(), ..Default::default() };
        let donors = self
            .directory
            .fetch_active_matching_donors(now)
            .await?
            .into_iter()
            .filter(|d| d.is_eligible_at(now))
            .collect::<Vec<MatchingDonor>>();
        if donors.is_empty() {
            info!("⚖️ No active matching donors. {} donations will be marked as processed.", donations.len());
            if !options.dry_run {
                for donation in &donations {
                    if let Err(e) = self.db.mark_donation_processed(donation.id).await {
                        error!("⚖️ Could not mark donation #{} as processed. {e}", donation.id);
                        result.errors.push(format!("Donation {}: {e}", donation.id));
                    }
                }
            }
            return Ok(result);
        }
        let donor_ids = donors.iter().map(|d| d.id.clone()).collect::<Vec<_>>();
        let mut book = BudgetBook::new(self.db.sum_matched_by_donor(&donor_ids).await?);
        let donors = order_donors(donors, self.ordering, &book);
        trace!("⚖️ Donor order: {:?}", donors.iter().map(|d| d.id.as_str()).collect::<Vec<_>>());

        for donation in &donations {
            let Some(amount) = donation.matchable_value() else {
                warn!(
                    "⚖️ Donation #{} has no usable USD value ({:?}). It stays unprocessed.",
                    donation.id, donation.value_at_donation_time_usd
                );
                continue;
            };
            let eligible =
                donors.iter().filter(|d| d.supports_project(&donation.project_slug)).collect::<Vec<&MatchingDonor>>();
            let plan = plan_matches(amount, &eligible, &book);
            if !options.dry_run {
                let entries = plan
                    .iter()
                    .map(|m| NewMatchingLogEntry {
                        donor_id: m.donor_id.clone(),
                        donation_id: donation.id,
                        matched_amount: m.matched_value,
                        project_slug: donation.project_slug.clone(),
                        date: now,
                    })
                    .collect();
                if let Err(e) = self.db.record_matches(donation.id, entries).await {
                    error!("⚖️ Could not record matches for donation #{}. {e}", donation.id);
                    result.errors.push(format!("Donation {}: {e}", donation.id));
                    continue;
                }
            }
            book.apply(&plan);
            let matched_value = plan.iter().map(|m| m.matched_value).sum::<Money>();
            debug!("⚖️ Donation #{} ({amount}) matched {} times for {matched_value}", donation.id, plan.len());
            result.matched += plan.len();
            result.total_matched_amount += matched_value;
        }
        info!(
            "⚖️ Matching {mode} complete. processed={}, matched={}, total={}, errors={}",
            result.processed,
            result.matched,
            result.total_matched_amount,
            result.errors.len()
        );
        Ok(result)
    }

    /// Ledger totals for `project_slug`, per donor, with donor names from the directory.
    pub async fn matched_donors_for_project(
        &self,
        project_slug: &str,
    ) -> Result<Vec<ProjectMatchSummary>, MatchingError> {
        let totals = self.db.matched_totals_for_project(project_slug).await?;
        if totals.is_empty() {
            return Ok(Vec::new());
        }
        let ids = totals.iter().map(|t| t.donor_id.clone()).collect::<Vec<_>>();
        let names = self
            .directory
            .fetch_matching_donors(&ids)
            .await?
            .into_iter()
            .map(|d| (d.id, d.name))
            .collect::<HashMap<_, _>>();
        let summary = totals
            .into_iter()
            .map(|t| ProjectMatchSummary {
                donor_name: names.get(&t.donor_id).cloned().unwrap_or_else(|| UNKNOWN_DONOR.to_string()),
                donor_id: t.donor_id,
                total_matched_amount: t.total_matched_amount,
            })
            .collect();
        Ok(summary)
    }
}
