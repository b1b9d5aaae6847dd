//! Guestbook and contribution persistence

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::models::{
    ContributionEntry, Domain, Entry, EntryContent, EventId, GuestbookEntry, PublicGuestbookEntry,
};
use crate::phone::PhoneNumber;
use crate::store::EntryStore;
use crate::time::{from_millis, Clock};
use crate::verification::VerifiedPhone;
use crate::{Error, Result};

const GUESTBOOK_COLUMNS: &str =
    "id, event_id, phone, name, message, is_public, is_verified, created_at, updated_at";
const CONTRIBUTION_COLUMNS: &str =
    "id, event_id, phone, name, amount, relationship, side, is_verified, created_at";

/// SQLite-backed [`EntryStore`]
pub struct SqliteEntryStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteEntryStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Corrupt id {:?}: {}", value, e)))
}

fn guestbook_from_row(row: &SqliteRow) -> Result<GuestbookEntry> {
    let id: String = row.get("id");
    let event_id: String = row.get("event_id");
    let phone: String = row.get("phone");

    Ok(GuestbookEntry {
        id: parse_uuid(&id)?,
        event_id: EventId(parse_uuid(&event_id)?),
        phone: PhoneNumber::parse(&phone)?,
        name: row.get("name"),
        message: row.get("message"),
        is_public: row.get("is_public"),
        is_verified: row.get("is_verified"),
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    })
}

fn contribution_from_row(row: &SqliteRow) -> Result<ContributionEntry> {
    let id: String = row.get("id");
    let event_id: String = row.get("event_id");
    let phone: String = row.get("phone");
    let relationship: String = row.get("relationship");
    let side: String = row.get("side");

    Ok(ContributionEntry {
        id: parse_uuid(&id)?,
        event_id: EventId(parse_uuid(&event_id)?),
        phone: PhoneNumber::parse(&phone)?,
        name: row.get("name"),
        amount: row.get("amount"),
        relationship: relationship.parse()?,
        side: side.parse()?,
        is_verified: row.get("is_verified"),
        created_at: from_millis(row.get("created_at")),
    })
}

fn entry_from_row(domain: Domain, row: &SqliteRow) -> Result<Entry> {
    match domain {
        Domain::Guestbook => guestbook_from_row(row).map(Entry::Guestbook),
        Domain::Contribution => contribution_from_row(row).map(Entry::Contribution),
    }
}

fn columns(domain: Domain) -> &'static str {
    match domain {
        Domain::Guestbook => GUESTBOOK_COLUMNS,
        Domain::Contribution => CONTRIBUTION_COLUMNS,
    }
}

/// Translate constraint violations into domain errors
fn map_insert_error(e: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return Error::AlreadySubmitted;
        }
        if db_err.is_foreign_key_violation() {
            return Error::NotFound("Event".to_string());
        }
    }
    Error::Database(e)
}

#[async_trait]
impl EntryStore for SqliteEntryStore {
    async fn find_verified(
        &self,
        event: EventId,
        phone: &PhoneNumber,
        domain: Domain,
    ) -> Result<Option<Entry>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE event_id = ? AND phone = ? AND is_verified = 1 LIMIT 1",
            columns(domain),
            domain.table()
        );

        let row = sqlx::query(&sql)
            .bind(event.to_string())
            .bind(phone.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(|r| entry_from_row(domain, r)).transpose()
    }

    async fn get(&self, domain: Domain, id: Uuid) -> Result<Option<Entry>> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?", columns(domain), domain.table());

        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(|r| entry_from_row(domain, r)).transpose()
    }

    async fn create(&self, event: EventId, phone: &VerifiedPhone, content: EntryContent) -> Result<Entry> {
        let content = content.normalized()?;
        let id = Uuid::new_v4();
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();
        let phone = phone.phone();

        let entry = match content {
            EntryContent::Guestbook(c) => {
                sqlx::query(
                    r#"
                    INSERT INTO guestbook_entries (
                        id, event_id, phone, name, message, is_public, is_verified, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
                    "#,
                )
                .bind(id.to_string())
                .bind(event.to_string())
                .bind(phone.as_str())
                .bind(&c.name)
                .bind(&c.message)
                .bind(c.is_public)
                .bind(now_ms)
                .bind(now_ms)
                .execute(&self.pool)
                .await
                .map_err(map_insert_error)?;

                Entry::Guestbook(GuestbookEntry {
                    id,
                    event_id: event,
                    phone: phone.clone(),
                    name: c.name,
                    message: c.message,
                    is_public: c.is_public,
                    is_verified: true,
                    created_at: from_millis(now_ms),
                    updated_at: from_millis(now_ms),
                })
            }
            EntryContent::Contribution(c) => {
                sqlx::query(
                    r#"
                    INSERT INTO contributions (
                        id, event_id, phone, name, amount, relationship, side, is_verified, created_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)
                    "#,
                )
                .bind(id.to_string())
                .bind(event.to_string())
                .bind(phone.as_str())
                .bind(&c.name)
                .bind(c.amount)
                .bind(c.relationship.as_str())
                .bind(c.side.as_str())
                .bind(now_ms)
                .execute(&self.pool)
                .await
                .map_err(map_insert_error)?;

                Entry::Contribution(ContributionEntry {
                    id,
                    event_id: event,
                    phone: phone.clone(),
                    name: c.name,
                    amount: c.amount,
                    relationship: c.relationship,
                    side: c.side,
                    is_verified: true,
                    created_at: from_millis(now_ms),
                })
            }
        };

        info!("Created {} entry {} for event {}", entry.domain(), id, event);
        Ok(entry)
    }

    async fn update(&self, domain: Domain, id: Uuid, phone: &PhoneNumber, patch: EntryContent) -> Result<Entry> {
        if patch.domain() != domain {
            return Err(Error::InvalidInput(format!(
                "Cannot apply {} fields to a {} entry",
                patch.domain(),
                domain
            )));
        }
        let patch = patch.normalized()?;
        let now_ms = self.clock.now().timestamp_millis();

        // Ownership is part of the WHERE clause so check and write are one step
        let result = match &patch {
            EntryContent::Guestbook(c) => {
                sqlx::query(
                    r#"
                    UPDATE guestbook_entries
                    SET name = ?, message = ?, is_public = ?, updated_at = ?
                    WHERE id = ? AND phone = ?
                    "#,
                )
                .bind(&c.name)
                .bind(&c.message)
                .bind(c.is_public)
                .bind(now_ms)
                .bind(id.to_string())
                .bind(phone.as_str())
                .execute(&self.pool)
                .await?
            }
            EntryContent::Contribution(c) => {
                sqlx::query(
                    r#"
                    UPDATE contributions
                    SET name = ?, amount = ?, relationship = ?, side = ?
                    WHERE id = ? AND phone = ?
                    "#,
                )
                .bind(&c.name)
                .bind(c.amount)
                .bind(c.relationship.as_str())
                .bind(c.side.as_str())
                .bind(id.to_string())
                .bind(phone.as_str())
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            warn!("Rejected {} update of {} by {}", domain, id, phone.masked());
            return Err(Error::NotOwner);
        }

        debug!("Updated {} entry {}", domain, id);
        self.get(domain, id)
            .await?
            .ok_or_else(|| Error::Internal(format!("{} entry {} vanished after update", domain, id)))
    }

    async fn delete(&self, domain: Domain, id: Uuid, phone: &PhoneNumber) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ? AND phone = ?", domain.table());

        let result = sqlx::query(&sql)
            .bind(id.to_string())
            .bind(phone.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            warn!("Rejected {} delete of {} by {}", domain, id, phone.masked());
            return Err(Error::NotOwner);
        }

        info!("Deleted {} entry {}", domain, id);
        Ok(())
    }

    async fn list_public_guestbook(&self, event: EventId) -> Result<Vec<PublicGuestbookEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, message, created_at
            FROM guestbook_entries
            WHERE event_id = ? AND is_verified = 1 AND is_public = 1
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(event.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                Ok(PublicGuestbookEntry {
                    id: parse_uuid(&id)?,
                    name: row.get("name"),
                    message: row.get("message"),
                    created_at: from_millis(row.get("created_at")),
                })
            })
            .collect()
    }
}
