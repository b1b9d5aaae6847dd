//! Verification code service
//!
//! Issues six-digit codes over SMS and checks them. Codes live five minutes
//! by default, are single-use, and issuing a new code for a phone retires
//! the previous one. Failed checks never say whether the code was wrong,
//! already used or expired.

use async_trait::async_trait;
use chrono::Duration;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::codes;
use crate::events::{EventBus, InviteEvent};
use crate::phone::PhoneNumber;
use crate::sms::SmsTransport;
use crate::time::{from_millis, Clock};
use crate::{Error, Result};

/// Digits in a verification code
pub const CODE_LENGTH: usize = 6;
/// Default code lifetime
pub const DEFAULT_CODE_TTL_SECS: i64 = 300;

/// A code that was stored and handed to the SMS transport
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub phone: PhoneNumber,
    pub issued_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub provider_message_id: String,
}

/// Proof that a phone just passed verification
///
/// Only [`VerificationCodes::verify`] implementations in this crate can
/// construct one, so holding a `VerifiedPhone` means a code was consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPhone(PhoneNumber);

impl VerifiedPhone {
    pub(crate) fn new(phone: PhoneNumber) -> Self {
        Self(phone)
    }

    pub fn phone(&self) -> &PhoneNumber {
        &self.0
    }

    pub fn into_phone(self) -> PhoneNumber {
        self.0
    }
}

/// Verification code collaborator
#[async_trait]
pub trait VerificationCodes: Send + Sync {
    /// Retire any active code for `phone`, store a new one and send it
    async fn issue(&self, phone: &PhoneNumber) -> Result<IssuedCode>;

    /// Consume the active code for `phone` if `code` matches and is unexpired
    async fn verify(&self, phone: &PhoneNumber, code: &str) -> Result<VerifiedPhone>;
}

/// SQLite-backed verification service
pub struct SqliteVerificationService {
    pool: SqlitePool,
    sms: Arc<dyn SmsTransport>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    ttl: Duration,
}

impl SqliteVerificationService {
    pub fn new(
        pool: SqlitePool,
        sms: Arc<dyn SmsTransport>,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            pool,
            sms,
            clock,
            events,
            ttl: Duration::seconds(DEFAULT_CODE_TTL_SECS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:0width$}", n, width = CODE_LENGTH)
}

/// Codes are stored as SHA-256 over phone and code
fn hash_code(phone: &PhoneNumber, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(phone.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn message_body(code: &str, ttl: Duration) -> String {
    format!(
        "[Invitation] Your verification code is {}. It expires in {} minutes.",
        code,
        ttl.num_minutes().max(1)
    )
}

fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

#[async_trait]
impl VerificationCodes for SqliteVerificationService {
    async fn issue(&self, phone: &PhoneNumber) -> Result<IssuedCode> {
        let code = generate_code();
        let issued_at = self.clock.now();
        let expires_at = issued_at + self.ttl;

        let id = codes::replace_active_code(
            &self.pool,
            phone,
            &hash_code(phone, &code),
            issued_at,
            expires_at,
        )
        .await?;

        let receipt = match self.sms.send(phone, &message_body(&code, self.ttl)).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!("Failed to send verification code to {}: {}", phone.masked(), e);
                // An undelivered code must not stay active
                if let Err(cleanup) = codes::withdraw_code(&self.pool, id).await {
                    error!("Failed to withdraw undelivered code {}: {}", id, cleanup);
                }
                return Err(e);
            }
        };

        info!("Verification code issued to {}", phone.masked());
        self.events.emit_lossy(InviteEvent::CodeIssued {
            masked_phone: phone.masked(),
            timestamp: issued_at,
        });

        Ok(IssuedCode {
            phone: phone.clone(),
            issued_at,
            expires_at,
            provider_message_id: receipt.provider_message_id,
        })
    }

    async fn verify(&self, phone: &PhoneNumber, code: &str) -> Result<VerifiedPhone> {
        let code = code.trim();
        if !is_well_formed(code) {
            return Err(Error::CodeInvalidOrExpired);
        }

        let active = match codes::load_active_code(&self.pool, phone).await? {
            Some(active) => active,
            None => {
                warn!("Verify for {} with no active code", phone.masked());
                return Err(Error::CodeInvalidOrExpired);
            }
        };

        let now = self.clock.now();
        let matches = active.code_hash == hash_code(phone, code);
        let unexpired = now < from_millis(active.expires_at_ms);

        if !(matches && unexpired) {
            codes::record_failed_attempt(&self.pool, active.id).await?;
            warn!(
                "Rejected verification for {} (attempt {})",
                phone.masked(),
                active.attempts_count + 1
            );
            return Err(Error::CodeInvalidOrExpired);
        }

        if !codes::consume_code(&self.pool, active.id).await? {
            warn!("Code for {} consumed concurrently", phone.masked());
            return Err(Error::CodeInvalidOrExpired);
        }

        info!("Phone verified: {}", phone.masked());
        self.events.emit_lossy(InviteEvent::PhoneVerified {
            masked_phone: phone.masked(),
            timestamp: now,
        });

        Ok(VerifiedPhone::new(phone.clone()))
    }
}
