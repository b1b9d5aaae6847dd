//! Submission resolver
//!
//! One submission attempt moves through
//! `CollectingPhone → Checking → (CodeIssued | Blocked) → Verifying →
//! Composing → Submitting → Submitted`, or to `Cancelled` from any
//! unfinished phase. Failed steps fall back to the phase they started
//! from. [`can_transition`] is the complete list of legal moves.
//!
//! Whether a phone gets a code in create mode, a code in edit mode, or is
//! blocked is decided by [`decide`], a pure function of the domain, the
//! duplicate check and the session marker.

use serde::Serialize;
use thiserror::Error;

use invite_common::db::{Domain, Entry, EntryContent};
use invite_common::time::display_kst;
use invite_common::{DuplicateCheck, PhoneNumber, VerifiedPhone};

use super::timers::Countdown;

/// Tag of a [`SubmissionState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    CollectingPhone,
    Checking,
    CodeIssued,
    Blocked,
    Verifying,
    Composing,
    Submitting,
    Submitted,
    Cancelled,
}

impl Phase {
    pub const ALL: [Phase; 9] = [
        Phase::CollectingPhone,
        Phase::Checking,
        Phase::CodeIssued,
        Phase::Blocked,
        Phase::Verifying,
        Phase::Composing,
        Phase::Submitting,
        Phase::Submitted,
        Phase::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Submitted | Phase::Cancelled)
    }
}

/// Legal phase transitions
pub fn can_transition(from: Phase, to: Phase) -> bool {
    use Phase::*;

    match from {
        CollectingPhone => matches!(to, Checking | Cancelled),
        // A failed check or issue falls back to collecting the phone
        Checking => matches!(to, CodeIssued | Blocked | CollectingPhone | Cancelled),
        // CodeIssued -> CodeIssued is a resend; -> Checking is a corrected number
        CodeIssued => matches!(to, Verifying | CodeIssued | Checking | Cancelled),
        // The guest may try a different number after being blocked
        Blocked => matches!(to, Checking | Cancelled),
        Verifying => matches!(to, Composing | CodeIssued | Cancelled),
        Composing => matches!(to, Submitting | Cancelled),
        Submitting => matches!(to, Submitted | Composing | Cancelled),
        Submitted | Cancelled => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: Phase,
    pub to: Phase,
}

/// Create or edit, as reported to the guest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    Create,
    Edit,
}

/// Create or edit, carrying the entry being edited
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Create,
    Edit(Entry),
}

impl Mode {
    pub fn kind(&self) -> SubmissionMode {
        match self {
            Mode::Create => SubmissionMode::Create,
            Mode::Edit(_) => SubmissionMode::Edit,
        }
    }
}

/// Result of the duplicate/session decision
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    IssueCode(Mode),
    Blocked(Entry),
}

/// Decide what happens to a phone that reached the duplicate check.
///
/// | domain       | duplicate | marker == entry phone | outcome    |
/// |--------------|-----------|-----------------------|------------|
/// | any          | none      | -                     | code, create |
/// | guestbook    | found     | yes                   | blocked    |
/// | guestbook    | found     | no / absent           | code, edit |
/// | contribution | found     | any                   | blocked    |
pub fn decide(domain: Domain, duplicate: &DuplicateCheck, marker: Option<&PhoneNumber>) -> Resolution {
    let existing = match duplicate {
        DuplicateCheck::NotFound => return Resolution::IssueCode(Mode::Create),
        DuplicateCheck::Found(entry) => entry,
    };

    match domain {
        Domain::Contribution => Resolution::Blocked(existing.clone()),
        Domain::Guestbook => {
            if marker == Some(existing.phone()) {
                Resolution::Blocked(existing.clone())
            } else {
                Resolution::IssueCode(Mode::Edit(existing.clone()))
            }
        }
    }
}

/// Message shown when a phone is blocked from submitting again
pub fn blocked_message(existing: &Entry) -> String {
    let when = display_kst(existing.created_at());
    match existing {
        Entry::Guestbook(e) => format!(
            "{} already left a guestbook message on {}. You have already submitted for this event; edit your message instead.",
            e.name, when
        ),
        Entry::Contribution(e) => format!(
            "{} already sent a contribution on {}. Contributions cannot be changed once sent.",
            e.name, when
        ),
    }
}

/// One submission attempt
#[derive(Debug, Clone)]
pub enum SubmissionState {
    CollectingPhone,
    Checking {
        phone: PhoneNumber,
    },
    CodeIssued {
        phone: PhoneNumber,
        mode: Mode,
        code_expiry: Countdown,
        resend_after: Countdown,
    },
    Blocked {
        message: String,
        /// The entry that blocks this attempt
        entry_id: uuid::Uuid,
    },
    Verifying {
        phone: PhoneNumber,
        mode: Mode,
        code_expiry: Countdown,
        resend_after: Countdown,
    },
    Composing {
        verified: VerifiedPhone,
        mode: Mode,
    },
    Submitting {
        verified: VerifiedPhone,
        mode: Mode,
    },
    Submitted {
        entry: Entry,
        mode: SubmissionMode,
    },
    Cancelled,
}

impl SubmissionState {
    pub fn phase(&self) -> Phase {
        match self {
            SubmissionState::CollectingPhone => Phase::CollectingPhone,
            SubmissionState::Checking { .. } => Phase::Checking,
            SubmissionState::CodeIssued { .. } => Phase::CodeIssued,
            SubmissionState::Blocked { .. } => Phase::Blocked,
            SubmissionState::Verifying { .. } => Phase::Verifying,
            SubmissionState::Composing { .. } => Phase::Composing,
            SubmissionState::Submitting { .. } => Phase::Submitting,
            SubmissionState::Submitted { .. } => Phase::Submitted,
            SubmissionState::Cancelled => Phase::Cancelled,
        }
    }

    /// Move to `next` if the transition table allows it
    pub fn advance(&mut self, next: SubmissionState) -> Result<(), IllegalTransition> {
        let from = self.phase();
        let to = next.phase();
        if !can_transition(from, to) {
            return Err(IllegalTransition { from, to });
        }
        *self = next;
        Ok(())
    }

    fn mode(&self) -> Option<&Mode> {
        match self {
            SubmissionState::CodeIssued { mode, .. }
            | SubmissionState::Verifying { mode, .. }
            | SubmissionState::Composing { mode, .. }
            | SubmissionState::Submitting { mode, .. } => Some(mode),
            _ => None,
        }
    }
}

/// What the guest sees after each step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub state: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<SubmissionMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Informational text, e.g. why the phone is blocked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Existing content, only in edit mode once verified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefill: Option<EntryContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_expires_in_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resend_available_in_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_phone: Option<PhoneNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<uuid::Uuid>,
}

impl StepResult {
    pub fn from_state(state: &SubmissionState) -> Self {
        let mut result = StepResult {
            state: state.phase(),
            mode: state.mode().map(Mode::kind),
            error_message: None,
            message: None,
            prefill: None,
            code_expires_in_secs: None,
            resend_available_in_secs: None,
            verified_phone: None,
            entry_id: None,
        };

        match state {
            SubmissionState::CodeIssued {
                code_expiry,
                resend_after,
                ..
            }
            | SubmissionState::Verifying {
                code_expiry,
                resend_after,
                ..
            } => {
                result.code_expires_in_secs = Some(code_expiry.remaining_secs());
                result.resend_available_in_secs = Some(resend_after.remaining_secs());
            }
            SubmissionState::Blocked { message, entry_id } => {
                result.message = Some(message.clone());
                result.entry_id = Some(*entry_id);
            }
            SubmissionState::Composing { verified, mode } | SubmissionState::Submitting { verified, mode } => {
                result.verified_phone = Some(verified.phone().clone());
                if let Mode::Edit(existing) = mode {
                    result.prefill = Some(existing.content());
                }
            }
            SubmissionState::Submitted { entry, mode } => {
                result.mode = Some(*mode);
                result.entry_id = Some(entry.id());
            }
            SubmissionState::CollectingPhone | SubmissionState::Checking { .. } | SubmissionState::Cancelled => {}
        }

        result
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }
}
