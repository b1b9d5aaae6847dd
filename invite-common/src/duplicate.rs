//! Duplicate detection
//!
//! Reports whether a phone already has a verified entry for an event in one
//! domain. Guestbook and contribution are checked independently.

use std::sync::Arc;
use tracing::debug;

use crate::db::models::{Domain, Entry, EventId};
use crate::phone::PhoneNumber;
use crate::store::EntryStore;
use crate::Result;

/// Outcome of a duplicate check
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateCheck {
    NotFound,
    Found(Entry),
}

impl DuplicateCheck {
    pub fn entry(&self) -> Option<&Entry> {
        match self {
            DuplicateCheck::NotFound => None,
            DuplicateCheck::Found(entry) => Some(entry),
        }
    }
}

#[derive(Clone)]
pub struct DuplicateDetector {
    store: Arc<dyn EntryStore>,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn EntryStore>) -> Self {
        Self { store }
    }

    /// Read-only lookup of the verified entry for (event, phone) in `domain`
    pub async fn check(&self, event: EventId, phone: &PhoneNumber, domain: Domain) -> Result<DuplicateCheck> {
        let found = self.store.find_verified(event, phone, domain).await?;
        debug!(
            "Duplicate check {} {} for {}: {}",
            event,
            domain,
            phone.masked(),
            if found.is_some() { "found" } else { "none" }
        );

        Ok(match found {
            Some(entry) => DuplicateCheck::Found(entry),
            None => DuplicateCheck::NotFound,
        })
    }
}
