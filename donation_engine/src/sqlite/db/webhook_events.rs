use sqlx::{types::Json, SqliteConnection};

use crate::db_types::{NewWebhookEvent, WebhookEvent};

pub async fn exists(eid: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM webhook_events WHERE eid = $1").bind(eid).fetch_optional(conn).await?;
    Ok(row.is_some())
}

pub async fn fetch_by_eid(eid: &str, conn: &mut SqliteConnection) -> Result<Option<WebhookEvent>, sqlx::Error> {
    let event = sqlx::query_as("SELECT * FROM webhook_events WHERE eid = $1").bind(eid).fetch_optional(conn).await?;
    Ok(event)
}

/// Records the event unless its `eid` is already present. This is a single statement, so two concurrent callers with
/// the same `eid` cannot both succeed. Returns `true` if this call wrote the record.
pub async fn insert_if_absent(event: NewWebhookEvent, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            INSERT INTO webhook_events (eid, event_type, payload, donation_id, processed)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (eid) DO NOTHING;
        "#,
    )
    .bind(event.eid)
    .bind(event.event_type)
    .bind(Json(event.payload))
    .bind(event.donation_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
