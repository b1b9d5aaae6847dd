//! Shared fixtures for invite-gw integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;
use tokio::sync::Semaphore;
use uuid::Uuid;

use invite_common::db::{
    init_database, upsert_event, Domain, Entry, EntryContent, EventId, EventKind, EventRecord,
    GuestbookContent, ContributionContent, PublicGuestbookEntry, Relationship, Side, SqliteEntryStore,
};
use invite_common::sms::MemorySmsTransport;
use invite_common::time::ManualClock;
use invite_common::verification::SqliteVerificationService;
use invite_common::{EntryStore, EventBus, InviteEvent, PhoneNumber, Result, VerifiedPhone};
use invite_gw::workflow::{SessionContext, Workflow, WorkflowDeps, WorkflowSettings};

/// Entry store that counts writes and can hold writes or lookups until released
pub struct CountingStore {
    inner: SqliteEntryStore,
    writes: AtomicUsize,
    entered: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
    lookups_entered: AtomicUsize,
    lookup_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl CountingStore {
    pub fn new(inner: SqliteEntryStore) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
            entered: AtomicUsize::new(0),
            gate: Mutex::new(None),
            lookups_entered: AtomicUsize::new(0),
            lookup_gate: Mutex::new(None),
        }
    }

    /// Make duplicate lookups wait until `release_lookups`
    pub fn hold_lookups(&self) {
        *self.lookup_gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_lookups(&self) {
        if let Some(gate) = self.lookup_gate.lock().unwrap().take() {
            gate.add_permits(1_000);
        }
    }

    pub async fn wait_for_lookups(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.lookups_entered.load(Ordering::SeqCst) < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("lookup was never reached");
    }

    /// Writes completed against the database
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Writes that reached the store, held or not
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Make writes wait until `release_writes`
    pub fn hold_writes(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_writes(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.add_permits(1_000);
        }
    }

    async fn pass_gate(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.unwrap();
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn wait_for_entered(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.entered() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("store was never reached");
    }
}

#[async_trait]
impl EntryStore for CountingStore {
    async fn find_verified(&self, event: EventId, phone: &PhoneNumber, domain: Domain) -> Result<Option<Entry>> {
        self.lookups_entered.fetch_add(1, Ordering::SeqCst);
        let gate = self.lookup_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.unwrap();
        }
        self.inner.find_verified(event, phone, domain).await
    }

    async fn get(&self, domain: Domain, id: Uuid) -> Result<Option<Entry>> {
        self.inner.get(domain, id).await
    }

    async fn create(&self, event: EventId, phone: &VerifiedPhone, content: EntryContent) -> Result<Entry> {
        self.pass_gate().await;
        self.inner.create(event, phone, content).await
    }

    async fn update(&self, domain: Domain, id: Uuid, phone: &PhoneNumber, patch: EntryContent) -> Result<Entry> {
        self.pass_gate().await;
        self.inner.update(domain, id, phone, patch).await
    }

    async fn delete(&self, domain: Domain, id: Uuid, phone: &PhoneNumber) -> Result<()> {
        self.inner.delete(domain, id, phone).await
    }

    async fn list_public_guestbook(&self, event: EventId) -> Result<Vec<PublicGuestbookEntry>> {
        self.inner.list_public_guestbook(event).await
    }
}

pub struct Harness {
    _dir: TempDir,
    pub pool: SqlitePool,
    pub sms: Arc<MemorySmsTransport>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<CountingStore>,
    pub events: EventBus,
    pub event: EventId,
    pub deps: WorkflowDeps,
}

/// Timers short enough for real sleeps
pub fn fast_settings() -> WorkflowSettings {
    WorkflowSettings {
        code_ttl: Duration::from_secs(300),
        resend_cooldown: Duration::ZERO,
        arrival_delay: Duration::from_millis(50),
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(fast_settings()).await
    }

    pub async fn with_settings(settings: WorkflowSettings) -> Self {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("invite.db")).await.unwrap();
        let sms = Arc::new(MemorySmsTransport::new());
        // 03:00 UTC is 12:00 in Seoul
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 16, 3, 0, 0).unwrap()));
        let events = EventBus::new(64);

        let event = EventId(Uuid::new_v4());
        upsert_event(
            &pool,
            &EventRecord {
                id: event,
                kind: EventKind::Wedding,
                title: "Kim & Lee".to_string(),
                side_a_host: "Kim".to_string(),
                side_b_host: "Lee".to_string(),
            },
        )
        .await
        .unwrap();

        let codes = SqliteVerificationService::new(pool.clone(), sms.clone(), clock.clone(), events.clone());
        let store = Arc::new(CountingStore::new(SqliteEntryStore::new(pool.clone(), clock.clone())));

        let deps = WorkflowDeps {
            codes: Arc::new(codes),
            store: store.clone(),
            events: events.clone(),
            settings,
        };

        Self {
            _dir: dir,
            pool,
            sms,
            clock,
            store,
            events,
            event,
            deps,
        }
    }

    /// A fresh browser session, optionally restored with a marker
    pub fn workflow(&self, marker: Option<&str>) -> Workflow {
        let session = match marker {
            Some(phone) => SessionContext::with_marker(PhoneNumber::parse(phone).unwrap()),
            None => SessionContext::new(),
        };
        Workflow::new(self.deps.clone(), Arc::new(session))
    }

    pub fn last_code(&self, phone: &str) -> String {
        self.sms
            .last_code_for(&PhoneNumber::parse(phone).unwrap())
            .expect("no code sent to phone")
    }

    pub async fn count_rows(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

pub fn guestbook(name: &str, message: &str) -> EntryContent {
    EntryContent::Guestbook(GuestbookContent {
        name: name.to_string(),
        message: message.to_string(),
        is_public: true,
    })
}

pub fn contribution(name: &str, amount: i64) -> EntryContent {
    EntryContent::Contribution(ContributionContent {
        name: name.to_string(),
        amount,
        relationship: Relationship::Friend,
        side: Side::B,
    })
}

/// Event type names received so far
pub fn drain(rx: &mut Receiver<InviteEvent>) -> Vec<String> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event.event_type().to_string());
    }
    seen
}
