//! Host notifications
//!
//! Push delivery lives elsewhere; this service records what would be sent.
//! Only durably stored contributions reach the bus, so every line logged
//! here corresponds to a real row.

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use invite_common::{EventBus, InviteEvent};

/// Log host-facing notifications until the bus closes
pub fn spawn_host_notifier(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(InviteEvent::ContributionCreated {
                    event_id,
                    entry_id,
                    name,
                    amount,
                    side,
                    ..
                }) => {
                    info!(
                        "Notify side {} hosts of event {}: {} sent {} KRW (entry {})",
                        side.as_str(),
                        event_id,
                        name,
                        amount,
                        entry_id
                    );
                }
                Ok(InviteEvent::GuestbookEntryCreated { event_id, entry_id, .. }) => {
                    info!("New guestbook entry {} for event {}", entry_id, event_id);
                }
                Ok(other) => {
                    debug!("Event: {}", other.event_type());
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Host notifier lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
