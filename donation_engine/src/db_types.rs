use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use dpg_common::Money;
use log::{error, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, FromRow, Row, Type};
use thiserror::Error;

pub type DonationId = i64;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------    DonationType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DonationType {
    Crypto,
    Fiat,
    Stock,
}

impl Display for DonationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DonationType::Crypto => write!(f, "crypto"),
            DonationType::Fiat => write!(f, "fiat"),
            DonationType::Stock => write!(f, "stock"),
        }
    }
}

impl FromStr for DonationType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crypto" => Ok(Self::Crypto),
            "fiat" => Ok(Self::Fiat),
            "stock" => Ok(Self::Stock),
            s => Err(ConversionError(format!("Invalid donation type: {s}"))),
        }
    }
}

//--------------------------------------      EventData      ---------------------------------------------------------
/// Every raw provider payload received for a donation, keyed by the event type that delivered it.
///
/// A later event of the same type replaces the earlier payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventData(BTreeMap<String, Value>);

impl EventData {
    pub fn insert<S: Into<String>>(&mut self, event_type: S, payload: Value) -> Option<Value> {
        self.0.insert(event_type.into(), payload)
    }

    pub fn get(&self, event_type: &str) -> Option<&Value> {
        self.0.get(event_type)
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.0.contains_key(event_type)
    }

    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

//--------------------------------------       Donation      ---------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: DonationId,
    /// Assigned by the processor on the crypto path
    pub pledge_id: Option<String>,
    /// Assigned by the processor on the stock path
    pub donation_uuid: Option<String>,
    pub project_slug: String,
    pub donation_type: DonationType,
    pub amount: Option<Money>,
    pub currency: Option<String>,
    /// The USD value that matching operates on
    #[serde(rename = "valueAtDonationTimeUSD")]
    pub value_at_donation_time_usd: Option<Money>,
    pub status: Option<String>,
    pub processed: bool,
    pub event_data: EventData,
    pub transaction_hash: Option<String>,
    pub payout_amount: Option<Money>,
    pub payout_currency: Option<String>,
    pub external_id: Option<String>,
    pub campaign_id: Option<String>,
    pub timestampms: Option<DateTime<Utc>>,
    pub eid: Option<String>,
    pub payment_method: Option<String>,
    pub converted_at: Option<DateTime<Utc>>,
    pub net_value_amount: Option<Money>,
    pub gross_amount: Option<Money>,
    pub net_value_currency: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Donation {
    /// The amount the matching engine works with, provided it is usable.
    pub fn matchable_value(&self) -> Option<Money> {
        self.value_at_donation_time_usd.filter(Money::is_positive)
    }
}

/// Money columns decode leniently. An unparseable amount reads as `None`, so one corrupt row cannot fail a whole fetch.
impl<'r> FromRow<'r, SqliteRow> for Donation {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: DonationId = row.try_get("id")?;
        let money = |column: &str| lenient_money(row, id, column);
        let event_data: sqlx::types::Json<EventData> = row.try_get("event_data")?;
        Ok(Self {
            id,
            pledge_id: row.try_get("pledge_id")?,
            donation_uuid: row.try_get("donation_uuid")?,
            project_slug: row.try_get("project_slug")?,
            donation_type: row.try_get("donation_type")?,
            amount: money("amount")?,
            currency: row.try_get("currency")?,
            value_at_donation_time_usd: money("value_at_donation_time_usd")?,
            status: row.try_get("status")?,
            processed: row.try_get("processed")?,
            event_data: event_data.0,
            transaction_hash: row.try_get("transaction_hash")?,
            payout_amount: money("payout_amount")?,
            payout_currency: row.try_get("payout_currency")?,
            external_id: row.try_get("external_id")?,
            campaign_id: row.try_get("campaign_id")?,
            timestampms: row.try_get("timestampms")?,
            eid: row.try_get("eid")?,
            payment_method: row.try_get("payment_method")?,
            converted_at: row.try_get("converted_at")?,
            net_value_amount: money("net_value_amount")?,
            gross_amount: money("gross_amount")?,
            net_value_currency: row.try_get("net_value_currency")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn lenient_money(row: &SqliteRow, id: DonationId, column: &str) -> Result<Option<Money>, sqlx::Error> {
    match row.try_get::<Option<Money>, _>(column) {
        Ok(value) => Ok(value),
        Err(sqlx::Error::ColumnDecode { source, .. }) => {
            warn!("🗃️ Donation #{id} has an invalid {column}, treating it as missing. {source}");
            Ok(None)
        },
        Err(e) => Err(e),
    }
}

//--------------------------------------     NewDonation     ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewDonation {
    pub pledge_id: Option<String>,
    pub donation_uuid: Option<String>,
    pub project_slug: String,
    pub donation_type: DonationType,
    pub amount: Option<Money>,
    pub currency: Option<String>,
    pub value_at_donation_time_usd: Option<Money>,
    pub status: Option<String>,
    /// Defaults to now. Matching runs consume donations in creation order.
    pub created_at: DateTime<Utc>,
}

impl NewDonation {
    pub fn new<S: Into<String>>(project_slug: S, donation_type: DonationType) -> Self {
        Self {
            pledge_id: None,
            donation_uuid: None,
            project_slug: project_slug.into(),
            donation_type,
            amount: None,
            currency: None,
            value_at_donation_time_usd: None,
            status: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_pledge_id<S: Into<String>>(mut self, pledge_id: S) -> Self {
        self.pledge_id = Some(pledge_id.into());
        self
    }

    pub fn with_donation_uuid<S: Into<String>>(mut self, uuid: S) -> Self {
        self.donation_uuid = Some(uuid.into());
        self
    }

    pub fn with_value_usd(mut self, value: Money) -> Self {
        self.value_at_donation_time_usd = Some(value);
        self
    }

    pub fn with_amount<S: Into<String>>(mut self, amount: Money, currency: S) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

//--------------------------------------   DonationUpdate    ---------------------------------------------------------
/// A partial update of a donation. Only the fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DonationUpdate {
    pub event_data: Option<EventData>,
    pub transaction_hash: Option<String>,
    pub payout_amount: Option<Money>,
    pub payout_currency: Option<String>,
    pub external_id: Option<String>,
    pub campaign_id: Option<String>,
    pub value_at_donation_time_usd: Option<Money>,
    pub currency: Option<String>,
    pub amount: Option<Money>,
    pub status: Option<String>,
    pub timestampms: Option<DateTime<Utc>>,
    pub eid: Option<String>,
    pub payment_method: Option<String>,
    pub converted_at: Option<DateTime<Utc>>,
    pub net_value_amount: Option<Money>,
    pub gross_amount: Option<Money>,
    pub net_value_currency: Option<String>,
}

impl DonationUpdate {
    pub fn with_event_data(event_data: EventData) -> Self {
        Self { event_data: Some(event_data), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

//--------------------------------------    MatchingType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchingType {
    /// Matches donations to any project
    AllProjects,
    /// Matches donations only to the projects listed in `supported_project_slugs`
    PerProject,
}

impl Display for MatchingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchingType::AllProjects => write!(f, "all-projects"),
            MatchingType::PerProject => write!(f, "per-project"),
        }
    }
}

impl FromStr for MatchingType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-projects" => Ok(Self::AllProjects),
            "per-project" => Ok(Self::PerProject),
            s => Err(ConversionError(format!("Invalid matching type: {s}"))),
        }
    }
}

//--------------------------------------     DonorStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonorStatus {
    Active,
    Inactive,
}

impl Display for DonorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DonorStatus::Active => write!(f, "active"),
            DonorStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl From<String> for DonorStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "active" => DonorStatus::Active,
            "inactive" => DonorStatus::Inactive,
            _ => {
                error!("🗃️ Invalid donor status: {value}. But this conversion cannot fail. Defaulting to inactive");
                DonorStatus::Inactive
            },
        }
    }
}

//--------------------------------------    MatchingDonor    ---------------------------------------------------------
/// A sponsor who tops up donations from a finite budget.
///
/// The definition comes from the CMS and is read-only as far as the engine is concerned. The budget that has already
/// been consumed is derived from the matching ledger, never stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingDonor {
    pub id: String,
    pub name: String,
    pub matching_type: MatchingType,
    pub total_matching_amount: Money,
    /// Each matched dollar of donation consumes `multiplier` dollars of budget
    pub multiplier: Decimal,
    #[serde(default)]
    pub supported_project_slugs: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: DonorStatus,
}

impl MatchingDonor {
    /// Active, and `now` falls inside the matching window (inclusive on both ends).
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.status == DonorStatus::Active && self.start_date <= now && now <= self.end_date
    }

    pub fn supports_project(&self, project_slug: &str) -> bool {
        match self.matching_type {
            MatchingType::AllProjects => true,
            MatchingType::PerProject => self.supported_project_slugs.iter().any(|s| s == project_slug),
        }
    }
}

impl<'r> FromRow<'r, SqliteRow> for MatchingDonor {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let decode_err = |column: &str, e: ConversionError| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        };
        let matching_type: String = row.try_get("matching_type")?;
        let matching_type = matching_type.parse().map_err(|e| decode_err("matching_type", e))?;
        let multiplier: String = row.try_get("multiplier")?;
        let multiplier = Decimal::from_str(&multiplier)
            .map_err(|e| decode_err("multiplier", ConversionError(format!("{multiplier}: {e}"))))?;
        let slugs: sqlx::types::Json<Vec<String>> = row.try_get("supported_project_slugs")?;
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            matching_type,
            total_matching_amount: row.try_get("total_matching_amount")?,
            multiplier,
            supported_project_slugs: slugs.0,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            status: DonorStatus::from(status),
        })
    }
}

//--------------------------------------  MatchingDonationLog ---------------------------------------------------------
/// One row of the append-only matching ledger.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingDonationLog {
    pub id: i64,
    pub donor_id: String,
    pub donation_id: DonationId,
    pub matched_amount: Money,
    pub project_slug: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMatchingLogEntry {
    pub donor_id: String,
    pub donation_id: DonationId,
    pub matched_amount: Money,
    pub project_slug: String,
    pub date: DateTime<Utc>,
}

//--------------------------------------     WebhookEvent    ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub id: i64,
    pub eid: String,
    pub event_type: String,
    #[sqlx(json)]
    pub payload: Value,
    pub donation_id: Option<DonationId>,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewWebhookEvent {
    pub eid: String,
    pub event_type: String,
    pub payload: Value,
    pub donation_id: Option<DonationId>,
}
