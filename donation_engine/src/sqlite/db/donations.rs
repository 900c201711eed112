use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{sqlite::SqliteRow, types::Json, FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{Donation, DonationId, DonationUpdate, NewDonation},
    traits::DonationStoreError,
};

/// Inserts a new donation. A clash on `pledge_id` or `donation_uuid` is reported as
/// [`DonationStoreError::DonationAlreadyExists`].
pub async fn insert_donation(donation: NewDonation, conn: &mut SqliteConnection) -> Result<Donation, DonationStoreError> {
    let external_id = donation.pledge_id.clone().or_else(|| donation.donation_uuid.clone()).unwrap_or_default();
    let result = sqlx::query_as(
        r#"
            INSERT INTO donations (
                pledge_id,
                donation_uuid,
                project_slug,
                donation_type,
                amount,
                currency,
                value_at_donation_time_usd,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *;
        "#,
    )
    .bind(donation.pledge_id)
    .bind(donation.donation_uuid)
    .bind(donation.project_slug)
    .bind(donation.donation_type)
    .bind(donation.amount)
    .bind(donation.currency)
    .bind(donation.value_at_donation_time_usd)
    .bind(donation.status)
    .bind(donation.created_at)
    .fetch_one(conn)
    .await;
    match result {
        Ok(donation) => Ok(donation),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(DonationStoreError::DonationAlreadyExists(external_id))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_donation(id: DonationId, conn: &mut SqliteConnection) -> Result<Option<Donation>, sqlx::Error> {
    let donation = sqlx::query_as("SELECT * FROM donations WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(donation)
}

pub async fn fetch_donation_by_pledge_id(
    pledge_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Donation>, sqlx::Error> {
    let donation =
        sqlx::query_as("SELECT * FROM donations WHERE pledge_id = $1").bind(pledge_id).fetch_optional(conn).await?;
    Ok(donation)
}

pub async fn fetch_donation_by_donation_uuid(
    uuid: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Donation>, sqlx::Error> {
    let donation =
        sqlx::query_as("SELECT * FROM donations WHERE donation_uuid = $1").bind(uuid).fetch_optional(conn).await?;
    Ok(donation)
}

/// Fetches the donations the matching engine has not seen yet, in creation order.
///
/// Timestamps are compared with `julianday` so that rows written by `CURRENT_TIMESTAMP` and rows written by sqlx
/// (RFC 3339) order correctly against each other.
pub async fn fetch_unprocessed_donations(
    min_date: Option<DateTime<Utc>>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Donation>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM donations WHERE processed = FALSE");
    if let Some(since) = min_date {
        builder.push(" AND julianday(created_at) >= julianday(");
        builder.push_bind(since);
        builder.push(")");
    }
    builder.push(" ORDER BY julianday(created_at) ASC, id ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let donations = builder.build_query_as::<Donation>().fetch_all(conn).await?;
    trace!("🗃️ Result of fetch_unprocessed_donations: {}", donations.len());
    Ok(donations)
}

pub(crate) async fn update_donation(
    id: DonationId,
    update: DonationUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Donation>, DonationStoreError> {
    if update.is_empty() {
        debug!("🗃️ No fields to update for donation {id}. Update request skipped.");
        return Err(DonationStoreError::DonationModificationNoOp);
    }
    let mut builder = QueryBuilder::new("UPDATE donations SET updated_at = CURRENT_TIMESTAMP, ");
    let mut set_clause = builder.separated(", ");
    if let Some(event_data) = update.event_data {
        set_clause.push("event_data = ");
        set_clause.push_bind_unseparated(Json(event_data));
    }
    if let Some(hash) = update.transaction_hash {
        set_clause.push("transaction_hash = ");
        set_clause.push_bind_unseparated(hash);
    }
    if let Some(payout) = update.payout_amount {
        set_clause.push("payout_amount = ");
        set_clause.push_bind_unseparated(payout);
    }
    if let Some(currency) = update.payout_currency {
        set_clause.push("payout_currency = ");
        set_clause.push_bind_unseparated(currency);
    }
    if let Some(external_id) = update.external_id {
        set_clause.push("external_id = ");
        set_clause.push_bind_unseparated(external_id);
    }
    if let Some(campaign_id) = update.campaign_id {
        set_clause.push("campaign_id = ");
        set_clause.push_bind_unseparated(campaign_id);
    }
    if let Some(value) = update.value_at_donation_time_usd {
        set_clause.push("value_at_donation_time_usd = ");
        set_clause.push_bind_unseparated(value);
    }
    if let Some(currency) = update.currency {
        set_clause.push("currency = ");
        set_clause.push_bind_unseparated(currency);
    }
    if let Some(amount) = update.amount {
        set_clause.push("amount = ");
        set_clause.push_bind_unseparated(amount);
    }
    if let Some(status) = update.status {
        set_clause.push("status = ");
        set_clause.push_bind_unseparated(status);
    }
    if let Some(ts) = update.timestampms {
        set_clause.push("timestampms = ");
        set_clause.push_bind_unseparated(ts);
    }
    if let Some(eid) = update.eid {
        set_clause.push("eid = ");
        set_clause.push_bind_unseparated(eid);
    }
    if let Some(method) = update.payment_method {
        set_clause.push("payment_method = ");
        set_clause.push_bind_unseparated(method);
    }
    if let Some(converted_at) = update.converted_at {
        set_clause.push("converted_at = ");
        set_clause.push_bind_unseparated(converted_at);
    }
    if let Some(net) = update.net_value_amount {
        set_clause.push("net_value_amount = ");
        set_clause.push_bind_unseparated(net);
    }
    if let Some(gross) = update.gross_amount {
        set_clause.push("gross_amount = ");
        set_clause.push_bind_unseparated(gross);
    }
    if let Some(currency) = update.net_value_currency {
        set_clause.push("net_value_currency = ");
        set_clause.push_bind_unseparated(currency);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let res = builder.build().fetch_optional(conn).await?.map(|row: SqliteRow| Donation::from_row(&row)).transpose()?;
    trace!("🗃️ Result of update_donation: {res:?}");
    Ok(res)
}

/// Flags the donation as processed. Returns `false` if it was already processed (or does not exist), leaving the row
/// untouched.
pub(crate) async fn mark_processed(id: DonationId, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE donations SET processed = TRUE, updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND processed = FALSE",
    )
    .bind(id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
