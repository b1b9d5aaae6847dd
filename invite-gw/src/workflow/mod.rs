//! Verification-gated submission workflow

pub mod handle;
pub mod modal;
pub mod resolver;
pub mod session;
pub mod single_flight;
pub mod timers;

pub use handle::{Workflow, WorkflowDeps, WorkflowHandle, WorkflowSettings};
pub use modal::{ArrivalOrigin, Choice, ModalController, ModalError, ModalPhase, ModalSnapshot};
pub use resolver::{decide, Mode, Phase, Resolution, StepResult, SubmissionMode, SubmissionState};
pub use session::SessionContext;
pub use single_flight::{FlightAborted, SingleFlight};
pub use timers::Countdown;
