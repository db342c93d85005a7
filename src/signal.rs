//! Process-wide shutdown intent.
//!
//! The `exit` primitive raises the flag; the core never acts on it. The
//! driver polls [`exit_requested`] after each top-level evaluation and
//! decides when to terminate the process.

use std::sync::atomic::{AtomicBool, Ordering};

static EXIT_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Request termination of the host process.
pub fn request_exit() {
    EXIT_REQUESTED.store(true, Ordering::SeqCst);
}

/// Whether termination has been requested.
pub fn exit_requested() -> bool {
    EXIT_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
pub(crate) fn reset() {
    EXIT_REQUESTED.store(false, Ordering::SeqCst);
}
