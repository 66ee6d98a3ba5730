//! One-shot readiness gate.

use parking_lot::{Condvar, Mutex};

/// Blocks waiters until opened; opening is permanent.
#[derive(Default)]
pub(crate) struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Open the gate. Returns `true` only for the call that opened it.
    pub(crate) fn open(&self) -> bool {
        let mut open = self.open.lock();
        if *open {
            return false;
        }
        *open = true;
        self.opened.notify_all();
        true
    }

    pub(crate) fn is_open(&self) -> bool {
        *self.open.lock()
    }

    /// Block until the gate is open.
    pub(crate) fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }
}
