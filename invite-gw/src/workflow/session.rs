//! Per-guest session context
//!
//! Holds what one browser session knows:
//! - the verified-session marker (phone that verified here, possibly
//!   restored from the client)
//! - the phone verified against this server in this session, which is the
//!   only identity allowed to delete entries
//! - whether the arrival prompt has been offered

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use invite_common::{PhoneNumber, VerifiedPhone};

#[derive(Debug, Default)]
pub struct SessionContext {
    marker: RwLock<Option<PhoneNumber>>,
    verified: RwLock<Option<VerifiedPhone>>,
    arrival_offered: AtomicBool,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session restored with a marker the client kept from earlier
    pub fn with_marker(phone: PhoneNumber) -> Self {
        Self {
            marker: RwLock::new(Some(phone)),
            ..Self::default()
        }
    }

    pub fn marker(&self) -> Option<PhoneNumber> {
        self.marker.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Phone verified against this server in this session
    pub fn verified_phone(&self) -> Option<VerifiedPhone> {
        self.verified.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Record a successful verification; sets the marker too
    pub fn record_verified(&self, phone: &VerifiedPhone) {
        *self.verified.write().unwrap_or_else(|e| e.into_inner()) = Some(phone.clone());
        *self.marker.write().unwrap_or_else(|e| e.into_inner()) = Some(phone.phone().clone());
    }

    /// Claim the single arrival prompt. True only for the first caller.
    pub fn take_arrival_offer(&self) -> bool {
        self.arrival_offered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn arrival_offered(&self) -> bool {
        self.arrival_offered.load(Ordering::SeqCst)
    }
}
