//! Event reference data

use sqlx::{Row, SqlitePool};

use crate::db::models::{EventId, EventRecord};
use crate::Result;

/// Load an event by id
pub async fn load_event(pool: &SqlitePool, id: EventId) -> Result<Option<EventRecord>> {
    let row = sqlx::query("SELECT id, kind, title, side_a_host, side_b_host FROM events WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let kind: String = row.get("kind");
    Ok(Some(EventRecord {
        id,
        kind: kind.parse()?,
        title: row.get("title"),
        side_a_host: row.get("side_a_host"),
        side_b_host: row.get("side_b_host"),
    }))
}

/// Insert or replace an event row
///
/// Events are normally written by the event-management tooling; this is
/// used for seeding and tests.
pub async fn upsert_event(pool: &SqlitePool, event: &EventRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO events (id, kind, title, side_a_host, side_b_host)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            kind = excluded.kind,
            title = excluded.title,
            side_a_host = excluded.side_a_host,
            side_b_host = excluded.side_b_host
        "#,
    )
    .bind(event.id.to_string())
    .bind(event.kind.as_str())
    .bind(&event.title)
    .bind(&event.side_a_host)
    .bind(&event.side_b_host)
    .execute(pool)
    .await?;

    Ok(())
}

/// Does an event with this id exist
pub async fn event_exists(pool: &SqlitePool, id: EventId) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE id = ?")
        .bind(id.to_string())
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}
