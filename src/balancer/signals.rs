//! Interrupt handling: SIGINT/SIGTERM raise a shared flag that the balancing
//! loop and the file locator poll between steps.
//!
//! Uses the `signal-hook` crate for safe signal registration. Nothing blocks on
//! signals; an in-flight move finishes (or is killed along with the process
//! group) before the loop notices.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable interrupt flag shared between the signal handler and the loop.
#[derive(Clone, Debug, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    /// A flag no signal is wired to. Raise it with [`InterruptFlag::raise`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a flag and register SIGINT/SIGTERM to raise it.
    ///
    /// Registration is best-effort; failures are reported on stderr but the
    /// balancer still runs (an unregistered signal then kills the process).
    #[cfg(feature = "signals")]
    #[must_use]
    pub fn install() -> Self {
        use signal_hook::consts::{SIGINT, SIGTERM};

        let flag = Self::new();
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&flag.raised)) {
            eprintln!("[BAL-SIGNAL] failed to register SIGINT: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&flag.raised)) {
            eprintln!("[BAL-SIGNAL] failed to register SIGTERM: {e}");
        }
        flag
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Relaxed)
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_flag_is_clear() {
        assert!(!InterruptFlag::new().is_raised());
    }

    #[test]
    fn clones_share_state() {
        let flag = InterruptFlag::new();
        let seen_by_loop = flag.clone();
        flag.raise();
        assert!(seen_by_loop.is_raised());
    }

    #[cfg(feature = "signals")]
    #[test]
    fn installed_flag_starts_clear() {
        let flag = InterruptFlag::install();
        assert!(!flag.is_raised());
    }
}
