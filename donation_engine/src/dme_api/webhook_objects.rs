use chrono::{DateTime, TimeZone, Utc};
use dpg_common::Money;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{db_types::DonationId, helpers::lenient};

pub const DEPOSIT_TRANSACTION: &str = "DEPOSIT_TRANSACTION";
pub const TRANSACTION_CONVERTED: &str = "TRANSACTION_CONVERTED";

/// The body the provider POSTs to the webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    pub event_type: String,
    /// Hex-encoded AES-256-CBC ciphertext of a JSON object
    pub payload: String,
}

/// The payload of a `DEPOSIT_TRANSACTION` event, as far as the reconciler needs it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositTransaction {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub eid: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub pledge_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub donation_uuid: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub transaction_hash: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_money")]
    pub payout_amount: Option<Money>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub payout_currency: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub external_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub campaign_id: Option<String>,
    #[serde(default, rename = "valueAtDonationTimeUSD", deserialize_with = "lenient::opt_money")]
    pub value_at_donation_time_usd: Option<Money>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_money")]
    pub amount: Option<Money>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_raw")]
    pub timestampms: Option<Value>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub payment_method: Option<String>,
}

/// The payload of a `TRANSACTION_CONVERTED` event. These only ever refer to a donation by `pledgeId`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionConverted {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub eid: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub pledge_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_raw")]
    pub converted_at: Option<Value>,
    #[serde(default, deserialize_with = "lenient::opt_money")]
    pub net_value_amount: Option<Money>,
    #[serde(default, deserialize_with = "lenient::opt_money")]
    pub gross_amount: Option<Money>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub net_value_currency: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_money")]
    pub payout_amount: Option<Money>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub payout_currency: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub external_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub campaign_id: Option<String>,
    #[serde(default, rename = "valueAtDonationTimeUSD", deserialize_with = "lenient::opt_money")]
    pub value_at_donation_time_usd: Option<Money>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_money")]
    pub amount: Option<Money>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_raw")]
    pub timestampms: Option<Value>,
}

/// The ids every event type may carry, read loosely. Used for event types the reconciler has no typed view of.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventIdentifiers {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub eid: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub pledge_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub donation_uuid: Option<String>,
}

/// A decrypted provider event, typed where the event type is known.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    DepositTransaction(DepositTransaction),
    TransactionConverted(TransactionConverted),
    Unknown(EventIdentifiers),
}

impl ProviderEvent {
    /// Gives the payload a typed view according to `event_type`. Fields of the wrong JSON type read as absent, so this
    /// never fails for a JSON object.
    pub fn parse(event_type: &str, payload: &Map<String, Value>) -> Self {
        let value = Value::Object(payload.clone());
        match event_type {
            DEPOSIT_TRANSACTION => {
                Self::DepositTransaction(serde_json::from_value(value).unwrap_or_default())
            },
            TRANSACTION_CONVERTED => {
                Self::TransactionConverted(serde_json::from_value(value).unwrap_or_default())
            },
            _ => Self::Unknown(serde_json::from_value(value).unwrap_or_default()),
        }
    }

    pub fn eid(&self) -> Option<&str> {
        match self {
            Self::DepositTransaction(e) => e.eid.as_deref(),
            Self::TransactionConverted(e) => e.eid.as_deref(),
            Self::Unknown(e) => e.eid.as_deref(),
        }
    }
}

/// A raw millisecond timestamp field converted to a UTC time.
///
/// `Ok(None)` means the field was absent. `Err` carries the offending value.
pub fn timestamp_field(value: Option<&Value>) -> Result<Option<DateTime<Utc>>, String> {
    match value {
        None => Ok(None),
        Some(v) => lenient::epoch_millis(v)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(Some)
            .ok_or_else(|| v.to_string()),
    }
}

/// What the reconciler did with a webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The donation was updated and the event recorded
    Applied { donation_id: DonationId },
    /// The `eid` had already been processed. Nothing changed.
    Duplicate { eid: String },
    /// An event of unknown type that could not be attached to a donation
    Ignored { reason: String },
}
