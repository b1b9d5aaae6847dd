//! Open guest sessions
//!
//! Sessions live in memory only. Each one records when it was last used;
//! a background sweep drops sessions idle for longer than the configured
//! limit, and new sessions are refused once the cap is reached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::workflow::ModalController;

/// Limits on open sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Sessions untouched for this long are dropped
    pub idle_ttl: Duration,
    pub max_open: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(1800),
            max_open: 10_000,
        }
    }
}

#[derive(Debug, Error)]
#[error("too many open sessions ({0})")]
pub struct RegistryFull(pub usize);

struct Slot {
    controller: Arc<ModalController>,
    last_seen: StdMutex<Instant>,
}

impl Slot {
    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_seen.lock().unwrap_or_else(|e| e.into_inner()).elapsed()
    }
}

#[derive(Clone)]
pub struct SessionRegistry {
    settings: SessionSettings,
    slots: Arc<RwLock<HashMap<Uuid, Slot>>>,
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    /// Register a new session, making room from idle ones when full
    pub async fn insert(&self, controller: Arc<ModalController>) -> Result<(), RegistryFull> {
        let mut slots = self.slots.write().await;
        if slots.len() >= self.settings.max_open {
            let evicted = Self::evict_from(&mut slots, self.settings.idle_ttl);
            if slots.len() >= self.settings.max_open {
                warn!("Refusing new session: {} open", slots.len());
                return Err(RegistryFull(slots.len()));
            }
            debug!("Evicted {} idle sessions to make room", evicted);
        }

        slots.insert(
            controller.id(),
            Slot {
                controller,
                last_seen: StdMutex::new(Instant::now()),
            },
        );
        Ok(())
    }

    /// Look up a session and mark it as used
    pub async fn get(&self, id: Uuid) -> Option<Arc<ModalController>> {
        let slots = self.slots.read().await;
        let slot = slots.get(&id)?;
        slot.touch();
        Some(slot.controller.clone())
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    /// Drop sessions idle longer than the configured limit
    pub async fn evict_idle(&self) -> usize {
        self.evict_older_than(self.settings.idle_ttl).await
    }

    pub async fn evict_older_than(&self, max_idle: Duration) -> usize {
        let mut slots = self.slots.write().await;
        Self::evict_from(&mut slots, max_idle)
    }

    fn evict_from(slots: &mut HashMap<Uuid, Slot>, max_idle: Duration) -> usize {
        let before = slots.len();
        slots.retain(|_, slot| slot.idle_for() < max_idle);
        before - slots.len()
    }

    /// Run [`evict_idle`](Self::evict_idle) every `every` until aborted
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = registry.evict_idle().await;
                if evicted > 0 {
                    info!("Evicted {} idle sessions ({} open)", evicted, registry.len().await);
                }
            }
        })
    }
}
