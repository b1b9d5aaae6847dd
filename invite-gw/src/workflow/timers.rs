//! Local countdowns
//!
//! Resend cooldown, code-expiry display and the arrival prompt delay all
//! run on tokio's clock. They live only in memory.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    deadline: Instant,
}

impl Countdown {
    pub fn start(length: Duration) -> Self {
        Self {
            deadline: Instant::now() + length,
        }
    }

    /// A countdown that has already run out
    pub fn elapsed() -> Self {
        Self {
            deadline: Instant::now(),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whole seconds left, rounded up so "1" shows until the very end
    pub fn remaining_secs(&self) -> u64 {
        let remaining = self.remaining();
        let secs = remaining.as_secs();
        if remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub async fn wait(&self) {
        tokio::time::sleep_until(self.deadline).await;
    }
}
