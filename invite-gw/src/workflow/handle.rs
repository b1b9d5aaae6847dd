//! Workflow handle: one submission attempt in one domain
//!
//! Every mutating step goes through its own [`SingleFlight`], so a double
//! click or a retried request joins the call already running instead of
//! issuing a second SMS or a second insert. The handle's state lock is
//! never held across a collaborator call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use invite_common::db::{Domain, Entry, EntryContent, EventId};
use invite_common::{
    DuplicateDetector, EntryStore, Error, EventBus, InviteEvent, PhoneNumber, VerificationCodes,
    VerifiedPhone,
};

use super::resolver::{blocked_message, decide, Mode, Phase, Resolution, StepResult, SubmissionMode, SubmissionState};
use super::session::SessionContext;
use super::single_flight::{FlightAborted, SingleFlight};
use super::timers::Countdown;

const CONSENT_REQUIRED: &str = "Please agree to the use of your phone number for verification.";
const CODE_FORMAT: &str = "Please enter the 6-digit verification code.";
const STEP_UNAVAILABLE: &str = "This step is not available right now.";
const GENERIC_FAILURE: &str = "Something went wrong. Please try again in a moment.";

/// Timer lengths used by the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Shown to the guest as the code expiry countdown
    pub code_ttl: Duration,
    pub resend_cooldown: Duration,
    pub arrival_delay: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            code_ttl: Duration::from_secs(300),
            resend_cooldown: Duration::from_secs(30),
            arrival_delay: Duration::from_secs(5),
        }
    }
}

/// Collaborators shared by every session
#[derive(Clone)]
pub struct WorkflowDeps {
    pub codes: Arc<dyn VerificationCodes>,
    pub store: Arc<dyn EntryStore>,
    pub events: EventBus,
    pub settings: WorkflowSettings,
}

/// Starts submission attempts for one guest session
#[derive(Clone)]
pub struct Workflow {
    deps: WorkflowDeps,
    session: Arc<SessionContext>,
}

impl Workflow {
    pub fn new(deps: WorkflowDeps, session: Arc<SessionContext>) -> Self {
        Self { deps, session }
    }

    pub fn deps(&self) -> &WorkflowDeps {
        &self.deps
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn begin_submission(&self, domain: Domain, event: EventId) -> WorkflowHandle {
        debug!("Begin {} submission for event {}", domain, event);
        WorkflowHandle {
            inner: Arc::new(HandleInner {
                domain,
                event,
                deps: self.deps.clone(),
                detector: DuplicateDetector::new(self.deps.store.clone()),
                session: self.session.clone(),
                state: Mutex::new(SubmissionState::CollectingPhone),
                cancelled: AtomicBool::new(false),
                phone_flight: SingleFlight::new(),
                code_flight: SingleFlight::new(),
                resend_flight: SingleFlight::new(),
                content_flight: SingleFlight::new(),
            }),
        }
    }
}

/// Handle to one submission attempt; cheap to clone
#[derive(Clone)]
pub struct WorkflowHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    domain: Domain,
    event: EventId,
    deps: WorkflowDeps,
    detector: DuplicateDetector,
    session: Arc<SessionContext>,
    state: Mutex<SubmissionState>,
    cancelled: AtomicBool,
    phone_flight: SingleFlight<StepResult>,
    code_flight: SingleFlight<StepResult>,
    resend_flight: SingleFlight<StepResult>,
    content_flight: SingleFlight<StepResult>,
}

impl WorkflowHandle {
    pub fn domain(&self) -> Domain {
        self.inner.domain
    }

    pub fn event(&self) -> EventId {
        self.inner.event
    }

    pub async fn snapshot(&self) -> StepResult {
        StepResult::from_state(&*self.inner.state.lock().await)
    }

    pub async fn phase(&self) -> Phase {
        self.inner.state.lock().await.phase()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Check for an existing entry, then issue a code or block
    pub async fn submit_phone(&self, phone: &str, consent: bool) -> StepResult {
        if !consent {
            return self.snapshot().await.with_error(CONSENT_REQUIRED);
        }
        let phone = match PhoneNumber::parse(phone) {
            Ok(phone) => phone,
            Err(e) => return self.snapshot().await.with_error(e.user_message()),
        };

        let inner = self.inner.clone();
        let result = self
            .inner
            .phone_flight
            .run(move || async move { inner.check_and_issue(phone).await })
            .await;
        self.settle(result).await
    }

    /// Verify the code sent to the phone
    pub async fn submit_code(&self, code: &str) -> StepResult {
        let code = code.trim().to_string();
        if code.len() != invite_common::verification::CODE_LENGTH || !code.bytes().all(|b| b.is_ascii_digit()) {
            return self.snapshot().await.with_error(CODE_FORMAT);
        }

        let inner = self.inner.clone();
        let result = self
            .inner
            .code_flight
            .run(move || async move { inner.verify(code).await })
            .await;
        self.settle(result).await
    }

    /// Issue a fresh code once the cooldown has passed
    pub async fn resend_code(&self) -> StepResult {
        let inner = self.inner.clone();
        let result = self
            .inner
            .resend_flight
            .run(move || async move { inner.resend().await })
            .await;
        self.settle(result).await
    }

    /// Create or update the entry with the composed fields
    pub async fn submit_content(&self, content: EntryContent) -> StepResult {
        if content.domain() != self.inner.domain {
            return self.snapshot().await.with_error(STEP_UNAVAILABLE);
        }
        let content = match content.normalized() {
            Ok(content) => content,
            Err(e) => return self.snapshot().await.with_error(e.user_message()),
        };

        let inner = self.inner.clone();
        let result = self
            .inner
            .content_flight
            .run(move || async move { inner.persist(content).await })
            .await;
        self.settle(result).await
    }

    /// Close the attempt. In-flight calls finish but their results are discarded.
    pub async fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let mut state = self.inner.state.lock().await;
        if state.advance(SubmissionState::Cancelled).is_ok() {
            debug!("{} submission for event {} cancelled", self.inner.domain, self.inner.event);
        }
    }

    async fn settle(&self, result: Result<StepResult, FlightAborted>) -> StepResult {
        match result {
            Ok(step) => step,
            Err(_) => self.snapshot().await.with_error(GENERIC_FAILURE),
        }
    }
}

impl HandleInner {
    fn snapshot_of(state: &SubmissionState) -> StepResult {
        StepResult::from_state(state)
    }

    async fn check_and_issue(&self, phone: PhoneNumber) -> StepResult {
        {
            let mut state = self.state.lock().await;
            if state
                .advance(SubmissionState::Checking { phone: phone.clone() })
                .is_err()
            {
                return Self::snapshot_of(&state).with_error(STEP_UNAVAILABLE);
            }
        }

        // The duplicate check always completes before any code is issued
        let duplicate = match self.detector.check(self.event, &phone, self.domain).await {
            Ok(duplicate) => duplicate,
            Err(e) => return self.fail_back(SubmissionState::CollectingPhone, &e).await,
        };

        let marker = self.session.marker();
        let mode = match decide(self.domain, &duplicate, marker.as_ref()) {
            Resolution::Blocked(existing) => {
                info!("{} submission blocked for {}", self.domain, phone.masked());
                let mut state = self.state.lock().await;
                let blocked = SubmissionState::Blocked {
                    message: blocked_message(&existing),
                    entry_id: existing.id(),
                };
                if state.advance(blocked).is_err() {
                    debug!("Discarding duplicate check result after cancel");
                }
                return Self::snapshot_of(&state);
            }
            Resolution::IssueCode(mode) => mode,
        };

        // A flow closed during the check must not send an SMS
        if self.cancelled.load(Ordering::SeqCst) {
            debug!("Flow closed during duplicate check; no code issued for {}", phone.masked());
            return Self::snapshot_of(&*self.state.lock().await);
        }

        let issued = match self.deps.codes.issue(&phone).await {
            Ok(issued) => issued,
            Err(e) => return self.fail_back(SubmissionState::CollectingPhone, &e).await,
        };

        let ttl = (issued.expires_at - issued.issued_at)
            .to_std()
            .unwrap_or(self.deps.settings.code_ttl);

        let mut state = self.state.lock().await;
        let next = SubmissionState::CodeIssued {
            phone,
            mode,
            code_expiry: Countdown::start(ttl),
            resend_after: Countdown::start(self.deps.settings.resend_cooldown),
        };
        if state.advance(next).is_err() {
            debug!("Discarding code issuance result after cancel");
        }
        Self::snapshot_of(&state)
    }

    async fn verify(&self, code: String) -> StepResult {
        let (phone, mode, code_expiry, resend_after) = {
            let mut state = self.state.lock().await;
            let SubmissionState::CodeIssued {
                phone,
                mode,
                code_expiry,
                resend_after,
            } = &*state
            else {
                return Self::snapshot_of(&state).with_error(STEP_UNAVAILABLE);
            };
            let (phone, mode, code_expiry, resend_after) = (phone.clone(), mode.clone(), *code_expiry, *resend_after);

            let verifying = SubmissionState::Verifying {
                phone: phone.clone(),
                mode: mode.clone(),
                code_expiry,
                resend_after,
            };
            if state.advance(verifying).is_err() {
                return Self::snapshot_of(&state).with_error(STEP_UNAVAILABLE);
            }
            (phone, mode, code_expiry, resend_after)
        };

        let verified = match self.deps.codes.verify(&phone, &code).await {
            Ok(verified) => verified,
            Err(e) => {
                let back = SubmissionState::CodeIssued {
                    phone,
                    mode,
                    code_expiry,
                    resend_after,
                };
                return self.fail_back(back, &e).await;
            }
        };

        {
            let mut state = self.state.lock().await;
            let composing = SubmissionState::Composing {
                verified: verified.clone(),
                mode: mode.clone(),
            };
            if state.advance(composing).is_err() {
                debug!("Discarding verification result after cancel");
                return Self::snapshot_of(&state);
            }
            // Marker written under the same lock that records the success
            self.session.record_verified(&verified);
        }

        if let Mode::Edit(existing) = mode {
            self.refresh_edit_target(&verified, existing).await;
        }

        Self::snapshot_of(&*self.state.lock().await)
    }

    /// Reload the entry being edited so the composer shows current content
    async fn refresh_edit_target(&self, verified: &VerifiedPhone, existing: Entry) {
        let fresh = match self.deps.store.get(self.domain, existing.id()).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!("Could not reload {} entry {}: {}", self.domain, existing.id(), e);
                return;
            }
        };

        let mode = match fresh {
            Some(entry) if entry.phone() == verified.phone() => Mode::Edit(entry),
            // Deleted (or replaced) since the check: write a new entry instead
            _ => Mode::Create,
        };

        let mut state = self.state.lock().await;
        if let SubmissionState::Composing { mode: current, .. } = &mut *state {
            *current = mode;
        }
    }

    async fn resend(&self) -> StepResult {
        let phone = {
            let state = self.state.lock().await;
            match &*state {
                SubmissionState::CodeIssued {
                    phone, resend_after, ..
                } => {
                    if !resend_after.is_elapsed() {
                        let wait = resend_after.remaining_secs();
                        return Self::snapshot_of(&state).with_error(format!(
                            "Please wait {} seconds before requesting a new code.",
                            wait
                        ));
                    }
                    phone.clone()
                }
                other => return Self::snapshot_of(other).with_error(STEP_UNAVAILABLE),
            }
        };

        let issued = match self.deps.codes.issue(&phone).await {
            Ok(issued) => issued,
            Err(e) => {
                error!("Resend to {} failed: {}", phone.masked(), e);
                return Self::snapshot_of(&*self.state.lock().await).with_error(e.user_message());
            }
        };

        let ttl = (issued.expires_at - issued.issued_at)
            .to_std()
            .unwrap_or(self.deps.settings.code_ttl);

        let mut state = self.state.lock().await;
        let mode = match &*state {
            SubmissionState::CodeIssued { mode, .. } => mode.clone(),
            other => {
                debug!("Discarding resend result in {:?}", other.phase());
                return Self::snapshot_of(other);
            }
        };
        let next = SubmissionState::CodeIssued {
            phone,
            mode,
            code_expiry: Countdown::start(ttl),
            resend_after: Countdown::start(self.deps.settings.resend_cooldown),
        };
        if state.advance(next).is_err() {
            debug!("Discarding resend result after cancel");
        }
        Self::snapshot_of(&state)
    }

    async fn persist(&self, content: EntryContent) -> StepResult {
        let (verified, mode) = {
            let mut state = self.state.lock().await;
            let SubmissionState::Composing { verified, mode } = &*state else {
                return Self::snapshot_of(&state).with_error(STEP_UNAVAILABLE);
            };
            let (verified, mode) = (verified.clone(), mode.clone());
            if state
                .advance(SubmissionState::Submitting {
                    verified: verified.clone(),
                    mode: mode.clone(),
                })
                .is_err()
            {
                return Self::snapshot_of(&state).with_error(STEP_UNAVAILABLE);
            }
            (verified, mode)
        };

        let written = match &mode {
            Mode::Create => self.deps.store.create(self.event, &verified, content).await,
            Mode::Edit(existing) => {
                self.deps
                    .store
                    .update(self.domain, existing.id(), verified.phone(), content)
                    .await
            }
        };

        let entry = match written {
            Ok(entry) => entry,
            Err(e) => {
                let back = SubmissionState::Composing { verified, mode };
                return self.fail_back(back, &e).await;
            }
        };

        // The row is durable: announce it even if the guest already closed the flow
        self.announce(&entry, mode.kind());

        let mut state = self.state.lock().await;
        let submitted = SubmissionState::Submitted {
            entry,
            mode: mode.kind(),
        };
        if state.advance(submitted).is_err() {
            debug!("Discarding submission result after cancel");
        }
        Self::snapshot_of(&state)
    }

    fn announce(&self, entry: &Entry, mode: SubmissionMode) {
        let timestamp = invite_common::time::now();
        let event = match (entry, mode) {
            (Entry::Guestbook(e), SubmissionMode::Create) => InviteEvent::GuestbookEntryCreated {
                event_id: e.event_id,
                entry_id: e.id,
                is_public: e.is_public,
                timestamp,
            },
            (Entry::Guestbook(e), SubmissionMode::Edit) => InviteEvent::GuestbookEntryUpdated {
                event_id: e.event_id,
                entry_id: e.id,
                timestamp,
            },
            (Entry::Contribution(e), SubmissionMode::Create) => InviteEvent::ContributionCreated {
                event_id: e.event_id,
                entry_id: e.id,
                name: e.name.clone(),
                amount: e.amount,
                side: e.side,
                timestamp,
            },
            (Entry::Contribution(e), SubmissionMode::Edit) => {
                debug!("Contribution {} updated; no notification", e.id);
                return;
            }
        };
        self.deps.events.emit_lossy(event);
    }

    /// Return to `back` after a failed step, unless the flow was closed meanwhile
    async fn fail_back(&self, back: SubmissionState, e: &Error) -> StepResult {
        match e {
            Error::CodeInvalidOrExpired | Error::InvalidInput(_) | Error::AlreadySubmitted | Error::NotOwner => {
                debug!("{} step rejected: {}", self.domain, e)
            }
            _ => error!("{} step failed: {}", self.domain, e),
        }

        let mut state = self.state.lock().await;
        if state.advance(back).is_err() {
            return Self::snapshot_of(&state);
        }
        Self::snapshot_of(&state).with_error(e.user_message())
    }
}
