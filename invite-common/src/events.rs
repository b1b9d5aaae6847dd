//! Event types for the invitation event system
//!
//! Provides the shared event definitions and EventBus. Submissions publish
//! here once they are durable; owner push notifications and page refreshes
//! subscribe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::db::models::{Domain, EventId, Side};

/// Invitation event types
///
/// Phone numbers travel only in masked form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InviteEvent {
    /// A verification code was dispatched
    CodeIssued {
        masked_phone: String,
        timestamp: DateTime<Utc>,
    },

    /// A phone completed verification
    PhoneVerified {
        masked_phone: String,
        timestamp: DateTime<Utc>,
    },

    /// A guestbook entry was inserted
    ///
    /// Triggers:
    /// - Page: refresh the public guestbook list
    GuestbookEntryCreated {
        event_id: EventId,
        entry_id: Uuid,
        is_public: bool,
        timestamp: DateTime<Utc>,
    },

    /// An existing guestbook entry was edited by its owner
    GuestbookEntryUpdated {
        event_id: EventId,
        entry_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A contribution row is durable
    ///
    /// Triggers:
    /// - Owner alert: push notification to the hosts of `side`
    ContributionCreated {
        event_id: EventId,
        entry_id: Uuid,
        name: String,
        amount: i64,
        side: Side,
        timestamp: DateTime<Utc>,
    },

    /// An entry was deleted by its owner
    EntryDeleted {
        event_id: EventId,
        domain: Domain,
        entry_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl InviteEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            InviteEvent::CodeIssued { .. } => "CodeIssued",
            InviteEvent::PhoneVerified { .. } => "PhoneVerified",
            InviteEvent::GuestbookEntryCreated { .. } => "GuestbookEntryCreated",
            InviteEvent::GuestbookEntryUpdated { .. } => "GuestbookEntryUpdated",
            InviteEvent::ContributionCreated { .. } => "ContributionCreated",
            InviteEvent::EntryDeleted { .. } => "EntryDeleted",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<InviteEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<InviteEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: InviteEvent,
    ) -> Result<usize, broadcast::error::SendError<InviteEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: InviteEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
