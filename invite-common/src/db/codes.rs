//! Verification code rows

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::phone::PhoneNumber;
use crate::Result;

/// Latest unconsumed code for a phone
#[derive(Debug, Clone)]
pub struct ActiveCode {
    pub id: i64,
    pub code_hash: String,
    pub expires_at_ms: i64,
    pub attempts_count: i64,
}

/// Expire every unconsumed code for `phone` and insert a fresh one.
///
/// Both statements run in one transaction so a concurrent verify never sees
/// two live codes. Returns the new row id.
pub async fn replace_active_code(
    pool: &SqlitePool,
    phone: &PhoneNumber,
    code_hash: &str,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<i64> {
    let issued_ms = issued_at.timestamp_millis();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE verification_codes
        SET expires_at = MIN(expires_at, ?)
        WHERE phone = ? AND is_verified = 0
        "#,
    )
    .bind(issued_ms)
    .bind(phone.as_str())
    .execute(&mut *tx)
    .await?;

    let result = sqlx::query(
        r#"
        INSERT INTO verification_codes (phone, code_hash, issued_at, expires_at, is_verified, attempts_count)
        VALUES (?, ?, ?, ?, 0, 0)
        "#,
    )
    .bind(phone.as_str())
    .bind(code_hash)
    .bind(issued_ms)
    .bind(expires_at.timestamp_millis())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(result.last_insert_rowid())
}

/// Remove a code that was never delivered
pub async fn withdraw_code(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM verification_codes WHERE id = ? AND is_verified = 0")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Load the most recently issued unconsumed code for `phone`
pub async fn load_active_code(pool: &SqlitePool, phone: &PhoneNumber) -> Result<Option<ActiveCode>> {
    let row = sqlx::query(
        r#"
        SELECT id, code_hash, expires_at, attempts_count
        FROM verification_codes
        WHERE phone = ? AND is_verified = 0
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(phone.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| ActiveCode {
        id: row.get("id"),
        code_hash: row.get("code_hash"),
        expires_at_ms: row.get("expires_at"),
        attempts_count: row.get("attempts_count"),
    }))
}

/// Record a failed verify attempt
pub async fn record_failed_attempt(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE verification_codes SET attempts_count = attempts_count + 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Mark a code consumed. Returns false if another caller consumed it first.
pub async fn consume_code(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("UPDATE verification_codes SET is_verified = 1 WHERE id = ? AND is_verified = 0")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Number of codes for `phone` that are unconsumed and unexpired at `now`
pub async fn count_active_codes(pool: &SqlitePool, phone: &PhoneNumber, now: DateTime<Utc>) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM verification_codes WHERE phone = ? AND is_verified = 0 AND expires_at > ?",
    )
    .bind(phone.as_str())
    .bind(now.timestamp_millis())
    .fetch_one(pool)
    .await?;

    Ok(count)
}
