use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use dpg_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The order in which eligible matching donors are offered a donation.
///
/// The order is fixed once per run, from the budget snapshot taken at the start of the run, so a dry run and the real
/// run that follows it allocate identically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonorOrdering {
    /// The order the directory lists them in
    #[default]
    Listing,
    /// Smallest remaining budget first, so small budgets are used up before large ones
    RemainingBudgetAsc,
    RemainingBudgetDesc,
    /// Earliest end date first
    EndingSoonest,
}

#[derive(Debug, Clone, Error)]
#[error("Unknown donor ordering: {0}. Use one of listing, remaining_budget_asc, remaining_budget_desc, ending_soonest")]
pub struct DonorOrderingParseError(String);

impl FromStr for DonorOrdering {
    type Err = DonorOrderingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "listing" => Ok(Self::Listing),
            "remaining_budget_asc" => Ok(Self::RemainingBudgetAsc),
            "remaining_budget_desc" => Ok(Self::RemainingBudgetDesc),
            "ending_soonest" => Ok(Self::EndingSoonest),
            _ => Err(DonorOrderingParseError(s.to_string())),
        }
    }
}

impl Display for DonorOrdering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Listing => "listing",
            Self::RemainingBudgetAsc => "remaining_budget_asc",
            Self::RemainingBudgetDesc => "remaining_budget_desc",
            Self::EndingSoonest => "ending_soonest",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchingOptions {
    /// Compute and report, but write nothing
    pub dry_run: bool,
    /// Only consider donations created at or after this time
    pub min_date: Option<DateTime<Utc>>,
}

impl MatchingOptions {
    pub fn live() -> Self {
        Self { dry_run: false, min_date: None }
    }

    pub fn dry_run() -> Self {
        Self { dry_run: true, min_date: None }
    }

    pub fn with_min_date(mut self, min_date: DateTime<Utc>) -> Self {
        self.min_date = Some(min_date);
        self
    }
}

/// Aggregates of one matching run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingResult {
    /// Every donation the run selected, including the ones it skipped
    pub processed: usize,
    /// Number of ledger entries (or, in a dry run, entries that would have been written)
    pub matched: usize,
    pub total_matched_amount: Money,
    /// One message per donation that failed. The rest of the batch still ran.
    pub errors: Vec<String>,
}

/// How much a single donor has matched on a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMatchSummary {
    pub donor_id: String,
    pub donor_name: String,
    pub total_matched_amount: Money,
}
