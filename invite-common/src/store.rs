//! Entry store adapter
//!
//! Create/update/delete for guestbook entries and contributions.
//!
//! - `create` takes a [`VerifiedPhone`], so only a caller that just passed
//!   verification can insert.
//! - `update` and `delete` succeed only when the supplied phone owns the
//!   row. A missing row and a row owned by someone else fail the same way
//!   ([`Error::NotOwner`](crate::Error::NotOwner)).
//! - There is no idempotency key; callers that retry must track their own
//!   request identity.

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::{Domain, Entry, EntryContent, EventId, PublicGuestbookEntry};
use crate::phone::PhoneNumber;
use crate::verification::VerifiedPhone;
use crate::Result;

#[async_trait]
pub trait EntryStore: Send + Sync {
    /// The verified entry for (event, phone) in `domain`, if any
    async fn find_verified(
        &self,
        event: EventId,
        phone: &PhoneNumber,
        domain: Domain,
    ) -> Result<Option<Entry>>;

    async fn get(&self, domain: Domain, id: Uuid) -> Result<Option<Entry>>;

    /// Insert a verified entry; the domain comes from `content`
    async fn create(&self, event: EventId, phone: &VerifiedPhone, content: EntryContent) -> Result<Entry>;

    /// Replace the editable fields of an entry owned by `phone`
    async fn update(&self, domain: Domain, id: Uuid, phone: &PhoneNumber, patch: EntryContent) -> Result<Entry>;

    /// Delete an entry owned by `phone`
    async fn delete(&self, domain: Domain, id: Uuid, phone: &PhoneNumber) -> Result<()>;

    /// Public, verified guestbook entries for an event, newest first
    async fn list_public_guestbook(&self, event: EventId) -> Result<Vec<PublicGuestbookEntry>>;
}
