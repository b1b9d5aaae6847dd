//! Modal workflow controller
//!
//! The guest-facing flow for one page session:
//! `WelcomeChoice → GuestbookFlow | ContributionFlow → ArrivalConfirm? →
//! ContributionFlow? → Completion`.
//!
//! Each flow owns a [`WorkflowHandle`]. Opening a flow bumps a generation
//! counter; a step that returns after its flow was closed sees a different
//! generation and its result is dropped.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use invite_common::db::{Domain, Entry, EntryContent, EventId};
use invite_common::InviteEvent;

use super::handle::{Workflow, WorkflowHandle};
use super::resolver::{Phase, StepResult};
use super::timers::Countdown;

/// Top-level modal phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalPhase {
    WelcomeChoice,
    GuestbookFlow,
    ContributionFlow,
    ArrivalConfirm,
    Completion,
}

/// Legal modal transitions
pub fn can_transition(from: ModalPhase, to: ModalPhase) -> bool {
    use ModalPhase::*;

    match from {
        WelcomeChoice => matches!(to, GuestbookFlow | ContributionFlow | ArrivalConfirm),
        GuestbookFlow => matches!(to, WelcomeChoice | ArrivalConfirm | ContributionFlow | Completion),
        ContributionFlow => matches!(to, WelcomeChoice | Completion),
        ArrivalConfirm => matches!(to, ContributionFlow | Completion | WelcomeChoice),
        Completion => matches!(to, WelcomeChoice),
    }
}

/// What the guest picked on the welcome screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    GuestbookWithContribution,
    ContributionOnly,
}

/// Where the arrival prompt came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalOrigin {
    PageLoad,
    AfterGuestbook,
}

enum ModalState {
    WelcomeChoice,
    GuestbookFlow(WorkflowHandle),
    ContributionFlow(WorkflowHandle),
    ArrivalConfirm(ArrivalOrigin),
    Completion,
}

impl ModalState {
    fn phase(&self) -> ModalPhase {
        match self {
            ModalState::WelcomeChoice => ModalPhase::WelcomeChoice,
            ModalState::GuestbookFlow(_) => ModalPhase::GuestbookFlow,
            ModalState::ContributionFlow(_) => ModalPhase::ContributionFlow,
            ModalState::ArrivalConfirm(_) => ModalPhase::ArrivalConfirm,
            ModalState::Completion => ModalPhase::Completion,
        }
    }

    fn flow(&self) -> Option<&WorkflowHandle> {
        match self {
            ModalState::GuestbookFlow(handle) | ModalState::ContributionFlow(handle) => Some(handle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModalError {
    #[error("cannot move from {from:?} to {to:?}")]
    IllegalTransition { from: ModalPhase, to: ModalPhase },

    #[error("no submission flow is open")]
    NoActiveFlow,
}

/// Controller state as reported to the page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModalSnapshot {
    pub phase: ModalPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice: Option<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_origin: Option<ArrivalOrigin>,
    /// Current step of the open flow, or the step that just finished it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepResult>,
}

struct Inner {
    state: ModalState,
    choice: Option<Choice>,
    generation: u64,
}

impl Inner {
    fn move_to(&mut self, next: ModalState) -> Result<(), ModalError> {
        let from = self.state.phase();
        let to = next.phase();
        if !can_transition(from, to) {
            return Err(ModalError::IllegalTransition { from, to });
        }
        debug!("Modal {:?} -> {:?}", from, to);
        self.state = next;
        self.generation += 1;
        Ok(())
    }
}

pub struct ModalController {
    id: Uuid,
    event: EventId,
    workflow: Workflow,
    inner: Mutex<Inner>,
}

impl ModalController {
    pub fn new(event: EventId, workflow: Workflow) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            workflow,
            inner: Mutex::new(Inner {
                state: ModalState::WelcomeChoice,
                choice: None,
                generation: 0,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event(&self) -> EventId {
        self.event
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub async fn phase(&self) -> ModalPhase {
        self.inner.lock().await.state.phase()
    }

    pub async fn snapshot(&self) -> ModalSnapshot {
        let (flow, snapshot) = {
            let inner = self.inner.lock().await;
            (inner.state.flow().cloned(), Self::bare_snapshot(&inner))
        };
        let step = match flow {
            Some(handle) => Some(handle.snapshot().await),
            None => None,
        };
        ModalSnapshot { step, ..snapshot }
    }

    fn bare_snapshot(inner: &Inner) -> ModalSnapshot {
        ModalSnapshot {
            phase: inner.state.phase(),
            choice: inner.choice,
            arrival_origin: match inner.state {
                ModalState::ArrivalConfirm(origin) => Some(origin),
                _ => None,
            },
            step: None,
        }
    }

    /// Route from the welcome screen into a flow
    pub async fn choose(&self, choice: Choice) -> Result<ModalSnapshot, ModalError> {
        let handle = {
            let mut inner = self.inner.lock().await;
            let (domain, wrap): (Domain, fn(WorkflowHandle) -> ModalState) = match choice {
                Choice::GuestbookWithContribution => (Domain::Guestbook, ModalState::GuestbookFlow),
                Choice::ContributionOnly => (Domain::Contribution, ModalState::ContributionFlow),
            };
            if inner.state.phase() != ModalPhase::WelcomeChoice {
                return Err(ModalError::IllegalTransition {
                    from: inner.state.phase(),
                    to: wrap_phase(domain),
                });
            }
            let handle = self.workflow.begin_submission(domain, self.event);
            inner.move_to(wrap(handle.clone()))?;
            inner.choice = Some(choice);
            handle
        };

        info!("Session {} chose {:?}", self.id, choice);
        Ok(self.snapshot_with(handle.snapshot().await).await)
    }

    pub async fn submit_phone(&self, phone: &str, consent: bool) -> Result<ModalSnapshot, ModalError> {
        let (generation, handle) = self.active_flow().await?;
        let step = handle.submit_phone(phone, consent).await;
        Ok(self.after_step(generation, &handle, step).await)
    }

    pub async fn submit_code(&self, code: &str) -> Result<ModalSnapshot, ModalError> {
        let (generation, handle) = self.active_flow().await?;
        let step = handle.submit_code(code).await;
        Ok(self.after_step(generation, &handle, step).await)
    }

    pub async fn resend_code(&self) -> Result<ModalSnapshot, ModalError> {
        let (generation, handle) = self.active_flow().await?;
        let step = handle.resend_code().await;
        Ok(self.after_step(generation, &handle, step).await)
    }

    pub async fn submit_content(&self, content: EntryContent) -> Result<ModalSnapshot, ModalError> {
        let (generation, handle) = self.active_flow().await?;
        let step = handle.submit_content(content).await;
        Ok(self.after_step(generation, &handle, step).await)
    }

    /// Close whatever is open.
    ///
    /// An open flow is cancelled and the guest returns to the welcome
    /// screen. Closing the arrival prompt counts as declining it.
    pub async fn close(&self) -> Result<ModalSnapshot, ModalError> {
        let cancelled = {
            let mut inner = self.inner.lock().await;
            match &inner.state {
                ModalState::GuestbookFlow(handle) | ModalState::ContributionFlow(handle) => {
                    let handle = handle.clone();
                    inner.move_to(ModalState::WelcomeChoice)?;
                    inner.choice = None;
                    Some(handle)
                }
                ModalState::ArrivalConfirm(_) => {
                    drop(inner);
                    return self.respond_arrival(false).await;
                }
                ModalState::WelcomeChoice | ModalState::Completion => None,
            }
        };

        if let Some(handle) = cancelled {
            handle.cancel().await;
        }
        Ok(self.snapshot().await)
    }

    /// Accept or decline the arrival prompt
    pub async fn respond_arrival(&self, accept: bool) -> Result<ModalSnapshot, ModalError> {
        let mut inner = self.inner.lock().await;
        let ModalState::ArrivalConfirm(origin) = inner.state else {
            return Err(ModalError::IllegalTransition {
                from: inner.state.phase(),
                to: if accept {
                    ModalPhase::ContributionFlow
                } else {
                    ModalPhase::Completion
                },
            });
        };

        if accept {
            let handle = self.workflow.begin_submission(Domain::Contribution, self.event);
            inner.move_to(ModalState::ContributionFlow(handle.clone()))?;
            drop(inner);
            info!("Session {} accepted arrival prompt", self.id);
            return Ok(self.snapshot_with(handle.snapshot().await).await);
        }

        match origin {
            ArrivalOrigin::PageLoad => inner.move_to(ModalState::WelcomeChoice)?,
            ArrivalOrigin::AfterGuestbook => inner.move_to(ModalState::Completion)?,
        }
        Ok(Self::bare_snapshot(&inner))
    }

    /// Leave the completion screen for a fresh welcome choice
    pub async fn restart(&self) -> Result<ModalSnapshot, ModalError> {
        let mut inner = self.inner.lock().await;
        if inner.state.phase() != ModalPhase::Completion {
            return Err(ModalError::IllegalTransition {
                from: inner.state.phase(),
                to: ModalPhase::WelcomeChoice,
            });
        }
        inner.move_to(ModalState::WelcomeChoice)?;
        inner.choice = None;
        Ok(Self::bare_snapshot(&inner))
    }

    /// Show the arrival prompt if the guest is idle on the welcome screen.
    ///
    /// Returns true if the prompt was shown.
    pub async fn offer_arrival_from_page_load(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.state.phase() != ModalPhase::WelcomeChoice {
            return false;
        }
        if self.workflow.session().marker().is_none() || !self.workflow.session().take_arrival_offer() {
            return false;
        }
        match inner.move_to(ModalState::ArrivalConfirm(ArrivalOrigin::PageLoad)) {
            Ok(()) => {
                info!("Session {} shown arrival prompt after page load", self.id);
                true
            }
            Err(_) => false,
        }
    }

    /// Start the page-load timer for the arrival prompt
    pub fn schedule_arrival_prompt(self: &Arc<Self>) -> JoinHandle<bool> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let delay = Countdown::start(self.workflow.deps().settings.arrival_delay);

        tokio::spawn(async move {
            delay.wait().await;
            match weak.upgrade() {
                Some(controller) => controller.offer_arrival_from_page_load().await,
                None => false,
            }
        })
    }

    /// Delete one of the guest's own entries.
    ///
    /// Ownership is checked against the phone verified in this session, not
    /// against anything the client sends.
    pub async fn delete_entry(&self, domain: Domain, entry_id: Uuid) -> invite_common::Result<()> {
        let Some(verified) = self.workflow.session().verified_phone() else {
            return Err(invite_common::Error::NotOwner);
        };

        let deps = self.workflow.deps();
        deps.store.delete(domain, entry_id, verified.phone()).await?;
        deps.events.emit_lossy(InviteEvent::EntryDeleted {
            event_id: self.event,
            domain,
            entry_id,
            timestamp: invite_common::time::now(),
        });
        Ok(())
    }

    /// Edit one of the guest's own guestbook messages.
    ///
    /// Same ownership rule as [`delete_entry`](Self::delete_entry).
    /// Contributions cannot be changed once sent.
    pub async fn update_entry(
        &self,
        domain: Domain,
        entry_id: Uuid,
        content: EntryContent,
    ) -> invite_common::Result<Entry> {
        if domain == Domain::Contribution {
            return Err(invite_common::Error::InvalidInput(
                "Contributions cannot be changed once sent.".to_string(),
            ));
        }
        let Some(verified) = self.workflow.session().verified_phone() else {
            return Err(invite_common::Error::NotOwner);
        };

        let deps = self.workflow.deps();
        let entry = deps.store.update(domain, entry_id, verified.phone(), content).await?;
        deps.events.emit_lossy(InviteEvent::GuestbookEntryUpdated {
            event_id: self.event,
            entry_id,
            timestamp: invite_common::time::now(),
        });
        Ok(entry)
    }

    async fn active_flow(&self) -> Result<(u64, WorkflowHandle), ModalError> {
        let inner = self.inner.lock().await;
        match inner.state.flow() {
            Some(handle) => Ok((inner.generation, handle.clone())),
            None => Err(ModalError::NoActiveFlow),
        }
    }

    async fn snapshot_with(&self, step: StepResult) -> ModalSnapshot {
        let inner = self.inner.lock().await;
        ModalSnapshot {
            step: Some(step),
            ..Self::bare_snapshot(&inner)
        }
    }

    /// Apply follow-on routing once a step returns
    async fn after_step(&self, generation: u64, handle: &WorkflowHandle, step: StepResult) -> ModalSnapshot {
        let mut inner = self.inner.lock().await;

        if inner.generation != generation {
            debug!("Session {}: dropping result from a closed flow", self.id);
            drop(inner);
            return self.snapshot().await;
        }

        if step.state == Phase::Submitted {
            let routed = match handle.domain() {
                Domain::Guestbook => self.route_after_guestbook(&mut inner),
                Domain::Contribution => inner.move_to(ModalState::Completion),
            };
            if let Err(e) = routed {
                debug!("Session {}: no follow-on route: {}", self.id, e);
            }
        }

        ModalSnapshot {
            step: Some(step),
            ..Self::bare_snapshot(&inner)
        }
    }

    fn route_after_guestbook(&self, inner: &mut Inner) -> Result<(), ModalError> {
        let session = self.workflow.session();
        if session.marker().is_some() && session.take_arrival_offer() {
            info!("Session {} shown arrival prompt after guestbook", self.id);
            return inner.move_to(ModalState::ArrivalConfirm(ArrivalOrigin::AfterGuestbook));
        }

        if inner.choice == Some(Choice::GuestbookWithContribution) {
            let handle = self.workflow.begin_submission(Domain::Contribution, self.event);
            return inner.move_to(ModalState::ContributionFlow(handle));
        }

        inner.move_to(ModalState::Completion)
    }
}

fn wrap_phase(domain: Domain) -> ModalPhase {
    match domain {
        Domain::Guestbook => ModalPhase::GuestbookFlow,
        Domain::Contribution => ModalPhase::ContributionFlow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modal_transition_table() {
        use ModalPhase::*;

        assert!(can_transition(WelcomeChoice, GuestbookFlow));
        assert!(can_transition(WelcomeChoice, ArrivalConfirm));
        assert!(!can_transition(WelcomeChoice, Completion));
        assert!(can_transition(GuestbookFlow, ArrivalConfirm));
        assert!(!can_transition(ContributionFlow, ArrivalConfirm));
        assert!(!can_transition(ContributionFlow, GuestbookFlow));
        assert!(can_transition(ArrivalConfirm, WelcomeChoice));
        assert!(can_transition(Completion, WelcomeChoice));
        assert!(!can_transition(Completion, GuestbookFlow));
    }
}
