use std::fmt::Debug;

use chrono::{DateTime, Duration, TimeZone, Utc};
use log::*;
use serde_json::{Map, Value};

use crate::{
    db_types::{Donation, DonationId, DonationUpdate, EventData, NewWebhookEvent},
    dme_api::{
        errors::WebhookError,
        webhook_objects::{
            timestamp_field,
            DepositTransaction,
            EventIdentifiers,
            ProviderEvent,
            TransactionConverted,
            WebhookEnvelope,
            WebhookOutcome,
        },
    },
    events::{DonationUpdatedEvent, EventProducers, MatchingRequested},
    helpers::{lenient, PayloadDecryptor},
    traits::{ApplyEventResult, DonationStore, DonationStoreError},
};

const MISSING_IDS: &str = "Missing pledgeId/donationUuid or eid in payload";

/// `WebhookApi` reconciles payment provider callbacks with the donations they refer to.
///
/// Each webhook is decrypted, checked for freshness and dispatched on its event type. Known event types update the
/// donation and record the event `eid` in one atomic step, so a redelivered event is a no-op. Once the event has been
/// handled, a [`MatchingRequested`] event is queued for whoever runs the matching engine; the webhook never waits for
/// matching.
pub struct WebhookApi<B> {
    db: B,
    decryptor: PayloadDecryptor,
    max_event_age: Duration,
    producers: EventProducers,
}

impl<B> Debug for WebhookApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookApi (max event age {}s)", self.max_event_age.num_seconds())
    }
}

impl<B> WebhookApi<B> {
    pub fn new(db: B, decryptor: PayloadDecryptor, producers: EventProducers) -> Self {
        Self { db, decryptor, max_event_age: Duration::hours(1), producers }
    }

    pub fn with_max_event_age(mut self, max_event_age: Duration) -> Self {
        self.max_event_age = max_event_age;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> WebhookApi<B>
where B: DonationStore
{
    pub async fn process_webhook(&self, envelope: WebhookEnvelope) -> Result<WebhookOutcome, WebhookError> {
        self.process_webhook_at(envelope, Utc::now()).await
    }

    /// Handles a webhook as if it arrived at `now`.
    pub async fn process_webhook_at(
        &self,
        envelope: WebhookEnvelope,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let WebhookEnvelope { event_type, payload } = envelope;
        info!("🪝️ Received {event_type} webhook");
        let payload = self.decryptor.decrypt(&payload).map_err(|e| {
            warn!("🪝️ Could not decrypt {event_type} payload. {e}");
            WebhookError::from(e)
        })?;
        self.check_freshness(&payload, now)?;
        let event = ProviderEvent::parse(&event_type, &payload);
        let eid = event.eid().map(String::from);
        let outcome = match event {
            ProviderEvent::DepositTransaction(deposit) => {
                self.handle_deposit_transaction(&event_type, &payload, deposit).await?
            },
            ProviderEvent::TransactionConverted(converted) => {
                self.handle_transaction_converted(&event_type, &payload, converted).await?
            },
            ProviderEvent::Unknown(ids) => self.handle_unknown_event(&event_type, &payload, ids).await,
        };
        debug!("🪝️ {event_type} webhook handled: {outcome:?}");
        let queued = self.producers.request_matching(MatchingRequested::from_webhook(&event_type, eid.as_deref()));
        trace!("🪝️ Matching requested from {queued} subscribers");
        Ok(outcome)
    }

    fn check_freshness(&self, payload: &Map<String, Value>, now: DateTime<Utc>) -> Result<(), WebhookError> {
        let raw = payload.get("eventTimestamp");
        let invalid = || {
            let raw = raw.map(|v| v.to_string()).unwrap_or_else(|| "missing".to_string());
            warn!("🪝️ Invalid eventTimestamp: {raw}");
            WebhookError::InvalidEventTimestamp(raw)
        };
        // Timestamps outside chrono's range cannot be a real event time
        let timestamp = raw
            .and_then(lenient::epoch_millis)
            .filter(|ms| Utc.timestamp_millis_opt(*ms).single().is_some())
            .ok_or_else(invalid)?;
        let age_ms = now.timestamp_millis().checked_sub(timestamp).ok_or_else(invalid)?;
        if age_ms > self.max_event_age.num_milliseconds() {
            warn!("🪝️ Outdated event: timestamp={timestamp}, current={}", now.timestamp_millis());
            return Err(WebhookError::OutdatedEvent {
                age_secs: age_ms / 1000,
                max_age_secs: self.max_event_age.num_seconds(),
            });
        }
        Ok(())
    }

    async fn handle_deposit_transaction(
        &self,
        event_type: &str,
        payload: &Map<String, Value>,
        deposit: DepositTransaction,
    ) -> Result<WebhookOutcome, WebhookError> {
        let eid = non_empty(deposit.eid).ok_or_else(|| WebhookError::ValidationError(MISSING_IDS.into()))?;
        let pledge_id = non_empty(deposit.pledge_id);
        let donation_uuid = non_empty(deposit.donation_uuid);
        if pledge_id.is_none() && donation_uuid.is_none() {
            return Err(WebhookError::ValidationError(MISSING_IDS.into()));
        }
        if self.db.has_webhook_event(&eid).await? {
            info!("🪝️ Event {eid} has already been processed. Skipping.");
            return Ok(WebhookOutcome::Duplicate { eid });
        }
        let donation = self
            .find_donation(pledge_id.as_deref(), donation_uuid.as_deref())
            .await?
            .ok_or_else(|| WebhookError::DonationNotFound(describe_ids(&pledge_id, &donation_uuid)))?;
        let timestampms = timestamp_field(deposit.timestampms.as_ref())
            .map_err(|v| WebhookError::ValidationError(format!("Invalid timestampms: {v}")))?;
        // A zero or missing value from the provider must not wipe out the value recorded at pledge time
        let value_at_donation_time_usd = deposit
            .value_at_donation_time_usd
            .filter(|v| !v.value().is_zero())
            .or(donation.value_at_donation_time_usd);
        let update = DonationUpdate {
            event_data: Some(merged_event_data(&donation, event_type, payload)),
            transaction_hash: non_empty(deposit.transaction_hash),
            payout_amount: deposit.payout_amount,
            payout_currency: deposit.payout_currency,
            external_id: deposit.external_id,
            campaign_id: deposit.campaign_id,
            value_at_donation_time_usd,
            currency: deposit.currency,
            amount: deposit.amount,
            status: deposit.status,
            timestampms,
            eid: Some(eid.clone()),
            payment_method: deposit.payment_method,
            ..Default::default()
        };
        self.commit_event(donation.id, update, event_type, eid, payload).await
    }

    async fn handle_transaction_converted(
        &self,
        event_type: &str,
        payload: &Map<String, Value>,
        converted: TransactionConverted,
    ) -> Result<WebhookOutcome, WebhookError> {
        let eid = non_empty(converted.eid);
        let pledge_id = non_empty(converted.pledge_id);
        let (Some(eid), Some(pledge_id)) = (eid, pledge_id) else {
            return Err(WebhookError::ValidationError("Missing pledgeId or eid in payload".into()));
        };
        if self.db.has_webhook_event(&eid).await? {
            info!("🪝️ Event {eid} has already been processed. Skipping.");
            return Ok(WebhookOutcome::Duplicate { eid });
        }
        let donation = self
            .db
            .fetch_donation_by_pledge_id(&pledge_id)
            .await?
            .ok_or_else(|| WebhookError::DonationNotFound(format!("pledgeId {pledge_id}")))?;
        let converted_at = timestamp_field(converted.converted_at.as_ref())
            .map_err(|v| WebhookError::ValidationError(format!("Invalid convertedAt: {v}")))?;
        let timestampms = timestamp_field(converted.timestampms.as_ref())
            .map_err(|v| WebhookError::ValidationError(format!("Invalid timestampms: {v}")))?;
        let update = DonationUpdate {
            event_data: Some(merged_event_data(&donation, event_type, payload)),
            converted_at,
            net_value_amount: converted.net_value_amount,
            gross_amount: converted.gross_amount,
            net_value_currency: converted.net_value_currency,
            payout_amount: converted.payout_amount,
            payout_currency: converted.payout_currency,
            external_id: converted.external_id,
            campaign_id: converted.campaign_id,
            value_at_donation_time_usd: converted.value_at_donation_time_usd,
            currency: converted.currency,
            amount: converted.amount,
            status: converted.status,
            timestampms,
            eid: Some(eid.clone()),
            ..Default::default()
        };
        self.commit_event(donation.id, update, event_type, eid, payload).await
    }

    /// Event types without a dedicated handler are attached to their donation on a best-effort basis. Nothing in
    /// here may fail the webhook.
    async fn handle_unknown_event(
        &self,
        event_type: &str,
        payload: &Map<String, Value>,
        ids: EventIdentifiers,
    ) -> WebhookOutcome {
        let pledge_id = non_empty(ids.pledge_id);
        let donation_uuid = non_empty(ids.donation_uuid);
        let eid = match non_empty(ids.eid) {
            Some(eid) if pledge_id.is_some() || donation_uuid.is_some() => eid,
            _ => {
                warn!("🪝️ Unhandled {event_type} event without identifiers. Ignoring it.");
                return WebhookOutcome::Ignored { reason: MISSING_IDS.into() };
            },
        };
        match self.db.has_webhook_event(&eid).await {
            Ok(true) => {
                info!("🪝️ Event {eid} has already been processed. Skipping.");
                return WebhookOutcome::Duplicate { eid };
            },
            Ok(false) => {},
            Err(e) => warn!("🪝️ Could not check whether {eid} was processed. Continuing anyway. {e}"),
        }
        let donation = match self.find_donation(pledge_id.as_deref(), donation_uuid.as_deref()).await {
            Ok(Some(donation)) => donation,
            Ok(None) => {
                let ids = describe_ids(&pledge_id, &donation_uuid);
                warn!("🪝️ No donation for unhandled {event_type} event ({ids}). Ignoring it.");
                return WebhookOutcome::Ignored { reason: format!("No donation matches {ids}") };
            },
            Err(e) => {
                error!("🪝️ Could not look up the donation for unhandled {event_type} event {eid}. {e}");
                return WebhookOutcome::Ignored { reason: e.to_string() };
            },
        };
        let event_data = merged_event_data(&donation, event_type, payload);
        if let Err(e) = self.db.update_donation(donation.id, DonationUpdate::with_event_data(event_data)).await {
            error!("🪝️ Could not store {event_type} payload on donation #{}. {e}", donation.id);
        }
        let record = new_event_record(donation.id, event_type, &eid, payload);
        match self.db.upsert_webhook_event(record).await {
            Ok(true) => info!("🪝️ Recorded unhandled {event_type} event {eid} against donation #{}", donation.id),
            Ok(false) => debug!("🪝️ Event {eid} was recorded concurrently"),
            Err(e) => error!("🪝️ Could not record {event_type} event {eid}. {e}"),
        }
        WebhookOutcome::Applied { donation_id: donation.id }
    }

    async fn commit_event(
        &self,
        donation_id: DonationId,
        update: DonationUpdate,
        event_type: &str,
        eid: String,
        payload: &Map<String, Value>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let record = new_event_record(donation_id, event_type, &eid, payload);
        match self.db.apply_donation_event(donation_id, update, record).await? {
            ApplyEventResult::Applied(donation) => {
                info!("🪝️ Processed {event_type}: eid={eid}, donation=#{donation_id}");
                self.producers.publish_donation_updated(DonationUpdatedEvent::new(event_type, *donation));
                Ok(WebhookOutcome::Applied { donation_id })
            },
            ApplyEventResult::Duplicate => {
                info!("🪝️ Event {eid} was processed by a concurrent delivery. Skipping.");
                Ok(WebhookOutcome::Duplicate { eid })
            },
        }
    }

    async fn find_donation(
        &self,
        pledge_id: Option<&str>,
        donation_uuid: Option<&str>,
    ) -> Result<Option<Donation>, DonationStoreError> {
        if let Some(pledge_id) = pledge_id {
            if let Some(donation) = self.db.fetch_donation_by_pledge_id(pledge_id).await? {
                return Ok(Some(donation));
            }
        }
        match donation_uuid {
            Some(uuid) => self.db.fetch_donation_by_donation_uuid(uuid).await,
            None => Ok(None),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn describe_ids(pledge_id: &Option<String>, donation_uuid: &Option<String>) -> String {
    match (pledge_id, donation_uuid) {
        (Some(p), Some(u)) => format!("pledgeId {p} or donationUuid {u}"),
        (Some(p), None) => format!("pledgeId {p}"),
        (None, Some(u)) => format!("donationUuid {u}"),
        (None, None) => "no identifiers".to_string(),
    }
}

fn merged_event_data(donation: &Donation, event_type: &str, payload: &Map<String, Value>) -> EventData {
    let mut event_data = donation.event_data.clone();
    event_data.insert(event_type, Value::Object(payload.clone()));
    event_data
}

fn new_event_record(
    donation_id: DonationId,
    event_type: &str,
    eid: &str,
    payload: &Map<String, Value>,
) -> NewWebhookEvent {
    NewWebhookEvent {
        eid: eid.to_string(),
        event_type: event_type.to_string(),
        payload: Value::Object(payload.clone()),
        donation_id: Some(donation_id),
    }
}
