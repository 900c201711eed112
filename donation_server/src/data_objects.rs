use chrono::{DateTime, Utc};
use donation_engine::matching_objects::{MatchingOptions, MatchingResult, ProjectMatchSummary};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{ServerError, INVALID_MIN_DATE};

/// The acknowledgement the payment provider expects from the webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub message: String,
}

impl Default for WebhookAck {
    fn default() -> Self {
        Self { message: "Webhook processed successfully".to_string() }
    }
}

/// Body of `POST /api/matching/process`. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingRequest {
    #[serde(default)]
    pub dry_run: Option<bool>,
    #[serde(default)]
    pub min_date: Option<String>,
}

impl MatchingRequest {
    /// Converts the request into engine options. Runs are live unless `dryRun` is set.
    pub fn into_options(self) -> Result<MatchingOptions, ServerError> {
        to_options(self.dry_run.unwrap_or(false), self.min_date)
    }
}

/// Query string of `GET /api/matching/process`. Runs are dry unless `dryRun=false` is given explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingQuery {
    #[serde(default)]
    pub dry_run: Option<String>,
    #[serde(default)]
    pub min_date: Option<String>,
}

impl MatchingQuery {
    pub fn into_options(self) -> Result<MatchingOptions, ServerError> {
        let dry_run = !matches!(self.dry_run.as_deref().map(str::trim), Some("false") | Some("0"));
        to_options(dry_run, self.min_date)
    }
}

fn to_options(dry_run: bool, min_date: Option<String>) -> Result<MatchingOptions, ServerError> {
    let mut options = if dry_run { MatchingOptions::dry_run() } else { MatchingOptions::live() };
    if let Some(date) = min_date.filter(|s| !s.trim().is_empty()) {
        options = options.with_min_date(parse_min_date(&date)?);
    }
    Ok(options)
}

fn parse_min_date(s: &str) -> Result<DateTime<Utc>, ServerError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // A bare date means the start of that day, UTC
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ServerError::InvalidQuery(INVALID_MIN_DATE.to_string()))
}

/// The matching run result as it is presented to operators. Amounts are plain numbers, rounded to cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingRunResponse {
    pub success: bool,
    pub dry_run: bool,
    pub processed: usize,
    pub matched: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_matched_amount: Decimal,
    pub errors: Vec<String>,
}

impl MatchingRunResponse {
    pub fn new(dry_run: bool, result: MatchingResult) -> Self {
        Self {
            success: true,
            dry_run,
            processed: result.processed,
            matched: result.matched,
            total_matched_amount: result.total_matched_amount.rounded().value(),
            errors: result.errors,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMatchRow {
    pub donor_id: String,
    pub donor_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_matched_amount: Decimal,
}

impl From<ProjectMatchSummary> for ProjectMatchRow {
    fn from(s: ProjectMatchSummary) -> Self {
        Self {
            donor_id: s.donor_id,
            donor_name: s.donor_name,
            total_matched_amount: s.total_matched_amount.rounded().value(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMatchReport {
    pub project_slug: String,
    pub donors: Vec<ProjectMatchRow>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectQuery {
    #[serde(default)]
    pub slug: Option<String>,
}
