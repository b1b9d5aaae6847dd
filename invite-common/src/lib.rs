//! # Invitation Common Library
//!
//! Shared code for the invitation services:
//! - Database models, schema and repositories
//! - Phone normalization
//! - Verification codes and SMS transports
//! - Duplicate detection
//! - Event bus (InviteEvent enum)
//! - Configuration loading

pub mod config;
pub mod db;
pub mod duplicate;
pub mod error;
pub mod events;
pub mod phone;
pub mod sms;
pub mod store;
pub mod time;
pub mod verification;

pub use duplicate::{DuplicateCheck, DuplicateDetector};
pub use error::{Error, Result};
pub use events::{EventBus, InviteEvent};
pub use phone::PhoneNumber;
pub use store::EntryStore;
pub use verification::{IssuedCode, VerificationCodes, VerifiedPhone};
