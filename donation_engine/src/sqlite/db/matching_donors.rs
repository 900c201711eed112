use chrono::{DateTime, Utc};
use sqlx::{types::Json, QueryBuilder, SqliteConnection};

use crate::db_types::MatchingDonor;

/// Active donors whose window contains `now`, in listing order.
pub async fn fetch_active(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<MatchingDonor>, sqlx::Error> {
    let donors = sqlx::query_as(
        r#"
        SELECT * FROM matching_donors
        WHERE status = 'active'
          AND julianday(start_date) <= julianday($1)
          AND julianday(end_date) >= julianday($1)
        ORDER BY listing_order ASC, id ASC
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(donors)
}

pub async fn fetch_by_ids(ids: &[String], conn: &mut SqliteConnection) -> Result<Vec<MatchingDonor>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new("SELECT * FROM matching_donors WHERE id IN (");
    let mut list = builder.separated(", ");
    for id in ids {
        list.push_bind(id.as_str());
    }
    builder.push(") ORDER BY listing_order ASC, id ASC");
    let donors = builder.build_query_as::<MatchingDonor>().fetch_all(conn).await?;
    Ok(donors)
}

/// Inserts or replaces a donor definition. This is the write side used by the CMS sync.
pub async fn upsert(donor: &MatchingDonor, listing_order: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO matching_donors (
            id, name, matching_type, total_matching_amount, multiplier, supported_project_slugs,
            start_date, end_date, status, listing_order
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE SET
            name = excluded.name,
            matching_type = excluded.matching_type,
            total_matching_amount = excluded.total_matching_amount,
            multiplier = excluded.multiplier,
            supported_project_slugs = excluded.supported_project_slugs,
            start_date = excluded.start_date,
            end_date = excluded.end_date,
            status = excluded.status,
            listing_order = excluded.listing_order,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(donor.id.as_str())
    .bind(donor.name.as_str())
    .bind(donor.matching_type.to_string())
    .bind(donor.total_matching_amount)
    .bind(donor.multiplier.normalize().to_string())
    .bind(Json(&donor.supported_project_slugs))
    .bind(donor.start_date)
    .bind(donor.end_date)
    .bind(donor.status.to_string())
    .bind(listing_order)
    .execute(conn)
    .await?;
    Ok(())
}
