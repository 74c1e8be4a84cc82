//! Page guard capability.
//!
//! A browser shell arms the guard to intercept reload, tab close and back
//! navigation while a payment is in progress, and reports intercepted attempts
//! back as `RefreshAttempted` / `BackAttempted` actions. Shells without such
//! hooks use [`NoopPageGuard`].

use std::sync::{Arc, Mutex, PoisonError};

/// Intercepts attempts to leave the payment page
pub trait PageGuard: Send + Sync {
    /// Start intercepting reload/close/back attempts
    fn arm(&self);

    /// Stop intercepting
    fn disarm(&self);
}

/// Guard for shells that cannot intercept navigation
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPageGuard;

impl PageGuard for NoopPageGuard {
    fn arm(&self) {}

    fn disarm(&self) {}
}

/// Guard that only remembers whether it is armed
///
/// Used by tests and by the demo driver to observe arm/disarm calls.
#[derive(Clone, Debug, Default)]
pub struct RecordingPageGuard {
    state: Arc<Mutex<GuardLog>>,
}

#[derive(Debug, Default)]
struct GuardLog {
    armed: bool,
    arm_calls: usize,
    disarm_calls: usize,
}

impl RecordingPageGuard {
    /// Create a disarmed guard
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> std::sync::MutexGuard<'_, GuardLog> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true if the guard is currently armed
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.log().armed
    }

    /// Number of `arm` calls so far
    #[must_use]
    pub fn arm_calls(&self) -> usize {
        self.log().arm_calls
    }

    /// Number of `disarm` calls so far
    #[must_use]
    pub fn disarm_calls(&self) -> usize {
        self.log().disarm_calls
    }
}

impl PageGuard for RecordingPageGuard {
    fn arm(&self) {
        let mut log = self.log();
        log.armed = true;
        log.arm_calls += 1;
    }

    fn disarm(&self) {
        let mut log = self.log();
        log.armed = false;
        log.disarm_calls += 1;
    }
}
