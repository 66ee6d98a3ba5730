//! Handle returned by every `on`/`subscribe` style call in the crate.

use parking_lot::Mutex;
use std::fmt;

type Teardown = Box<dyn FnOnce() + Send>;

/// Deregisters exactly one subscription.
///
/// Dropping the handle does not unsubscribe; call [`Unsubscribe::unsubscribe`].
/// Calling it more than once is a no-op.
pub struct Unsubscribe {
    teardown: Mutex<Option<Teardown>>,
}

impl Unsubscribe {
    pub(crate) fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Mutex::new(Some(Box::new(teardown))),
        }
    }

    /// A handle with nothing to tear down.
    pub fn noop() -> Self {
        Self {
            teardown: Mutex::new(None),
        }
    }

    pub fn unsubscribe(&self) {
        let teardown = self.teardown.lock().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    /// False once `unsubscribe` has run (or for a no-op handle).
    pub fn is_active(&self) -> bool {
        self.teardown.lock().is_some()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.is_active())
            .finish()
    }
}
