//! Single-flight guard
//!
//! Concurrent callers of the same action share one in-flight result. The
//! work runs on its own task, so a caller that goes away (for example a
//! disconnected HTTP client) does not cancel it. The slot is cleared when
//! the work finishes, so the next call after completion starts fresh.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::error;

/// The spawned work panicked or was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("in-flight work did not complete")]
pub struct FlightAborted;

type Flight<T> = Shared<BoxFuture<'static, Result<T, FlightAborted>>>;

struct Slot<T> {
    next_id: u64,
    current: Option<(u64, Flight<T>)>,
}

pub struct SingleFlight<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                next_id: 0,
                current: None,
            })),
        }
    }
}

fn lock<T>(slot: &Mutex<Slot<T>>) -> MutexGuard<'_, Slot<T>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight call, or start `work` if none is running.
    ///
    /// `work` is only invoked by the caller that starts the flight.
    pub async fn run<F, Fut>(&self, work: F) -> Result<T, FlightAborted>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = {
            let mut slot = lock(&self.slot);
            match &slot.current {
                Some((_, flight)) => flight.clone(),
                None => {
                    let id = slot.next_id;
                    slot.next_id += 1;

                    let fut = work();
                    let owner = Arc::clone(&self.slot);
                    // The task cannot clear the slot before we store the
                    // flight: clearing needs the lock we are holding.
                    let handle = tokio::spawn(async move {
                        let output = fut.await;
                        let mut slot = lock(&owner);
                        if matches!(&slot.current, Some((current, _)) if *current == id) {
                            slot.current = None;
                        }
                        output
                    });

                    let flight = async move {
                        handle.await.map_err(|e| {
                            error!("Single-flight task failed: {}", e);
                            FlightAborted
                        })
                    }
                    .boxed()
                    .shared();

                    slot.current = Some((id, flight.clone()));
                    flight
                }
            }
        };

        let result = flight.await;

        // A panicked task never reaches its own cleanup
        if result.is_err() {
            let mut slot = lock(&self.slot);
            if let Some((_, current)) = &slot.current {
                if current.peek().is_some() {
                    slot.current = None;
                }
            }
        }

        result
    }

    pub fn is_in_flight(&self) -> bool {
        lock(&self.slot).current.is_some()
    }
}
