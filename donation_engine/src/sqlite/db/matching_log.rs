use std::collections::HashMap;

use dpg_common::Money;
use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::db_types::{DonationId, MatchingDonationLog, NewMatchingLogEntry};

pub async fn append_entry(
    entry: NewMatchingLogEntry,
    conn: &mut SqliteConnection,
) -> Result<MatchingDonationLog, sqlx::Error> {
    let row = sqlx::query_as(
        r#"
            INSERT INTO matching_donation_log (donor_id, donation_id, matched_amount, project_slug, date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(entry.donor_id)
    .bind(entry.donation_id)
    .bind(entry.matched_amount)
    .bind(entry.project_slug)
    .bind(entry.date)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn entries_for_donation(
    donation_id: DonationId,
    conn: &mut SqliteConnection,
) -> Result<Vec<MatchingDonationLog>, sqlx::Error> {
    let rows = sqlx::query_as("SELECT * FROM matching_donation_log WHERE donation_id = $1 ORDER BY id")
        .bind(donation_id)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

/// Sums the ledger for each donor in `donor_ids`.
pub async fn sum_by_donor(
    donor_ids: &[String],
    conn: &mut SqliteConnection,
) -> Result<HashMap<String, Money>, sqlx::Error> {
    if donor_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut builder = QueryBuilder::new("SELECT donor_id, matched_amount FROM matching_donation_log WHERE donor_id IN (");
    let mut ids = builder.separated(", ");
    for id in donor_ids {
        ids.push_bind(id.as_str());
    }
    builder.push(")");
    trace!("🗃️ Executing query: {}", builder.sql());
    let rows: Vec<(String, Money)> = builder.build_query_as().fetch_all(conn).await?;
    Ok(fold_totals(rows))
}

/// Per-donor ledger totals for a single project, largest first.
pub async fn totals_for_project(
    project_slug: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<(String, Money)>, sqlx::Error> {
    let rows: Vec<(String, Money)> =
        sqlx::query_as("SELECT donor_id, matched_amount FROM matching_donation_log WHERE project_slug = $1")
            .bind(project_slug)
            .fetch_all(conn)
            .await?;
    let mut totals = fold_totals(rows).into_iter().collect::<Vec<_>>();
    totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(totals)
}

fn fold_totals(rows: Vec<(String, Money)>) -> HashMap<String, Money> {
    rows.into_iter().fold(HashMap::new(), |mut acc, (donor_id, amount)| {
        *acc.entry(donor_id).or_default() += amount;
        acc
    })
}
