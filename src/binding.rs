//! Binding observable sources to a UI render cycle.
//!
//! A [`Binding`] subscribes on mount and unsubscribes on unmount (or drop),
//! asking its [`Renderer`] to re-render once per committed change.
//! Mounting an already mounted binding does nothing, so re-binds never
//! double-invoke the renderer.

use crate::auth::{Session, SessionSync};
use crate::state::{Filter, StateStore};
use crate::subscription::Unsubscribe;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Host-side hook that schedules a re-render.
pub trait Renderer: Send + Sync {
    fn invalidate(&self);
}

impl<F: Fn() + Send + Sync> Renderer for F {
    fn invalidate(&self) {
        self()
    }
}

/// A value a UI component can watch.
pub trait Observable {
    type Snapshot;

    fn snapshot(&self) -> Self::Snapshot;

    /// Call `on_change` after each change until unsubscribed.
    fn observe(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Unsubscribe;
}

impl Observable for StateStore {
    type Snapshot = Arc<Value>;

    fn snapshot(&self) -> Arc<Value> {
        self.read()
    }

    fn observe(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Unsubscribe {
        self.subscribe(move |_, _| on_change(), Filter::Always)
    }
}

/// Mount-scoped subscription of a renderer to a source.
pub struct Binding<S: Observable> {
    source: S,
    renderer: Arc<dyn Renderer>,
    mounted: Mutex<Option<Unsubscribe>>,
}

impl<S: Observable> Binding<S> {
    /// An unmounted binding.
    pub fn new(source: S, renderer: impl Renderer + 'static) -> Self {
        Self {
            source,
            renderer: Arc::new(renderer),
            mounted: Mutex::new(None),
        }
    }

    /// Subscribe the renderer. Returns `false` if already mounted.
    pub fn mount(&self) -> bool {
        let mut mounted = self.mounted.lock();
        if mounted.is_some() {
            return false;
        }
        let renderer = Arc::clone(&self.renderer);
        *mounted = Some(self.source.observe(Box::new(move || renderer.invalidate())));
        debug!("binding mounted");
        true
    }

    /// Unsubscribe the renderer. Returns `false` if not mounted.
    pub fn unmount(&self) -> bool {
        let handle = self.mounted.lock().take();
        match handle {
            Some(handle) => {
                handle.unsubscribe();
                debug!("binding unmounted");
                true
            }
            None => false,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.lock().is_some()
    }

    /// The source's current value.
    pub fn current(&self) -> S::Snapshot {
        self.source.snapshot()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl Binding<StateStore> {
    /// `(current value, writer)`, the pair a component renders from.
    pub fn state(&self) -> (Arc<Value>, StateStore) {
        (self.source.read(), self.source.clone())
    }
}

impl<S: Observable> Drop for Binding<S> {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Bind a store to `renderer` and mount it.
pub fn use_state(store: &StateStore, renderer: impl Renderer + 'static) -> Binding<StateStore> {
    let binding = Binding::new(store.clone(), renderer);
    binding.mount();
    binding
}

/// Bind the current session to `renderer` and mount it.
pub fn use_session(sync: &SessionSync, renderer: impl Renderer + 'static) -> Binding<SessionSync> {
    let binding = Binding::new(sync.clone(), renderer);
    binding.mount();
    binding
}

/// Convenience for session snapshots.
impl Binding<SessionSync> {
    pub fn session(&self) -> Option<Session> {
        self.source.session()
    }
}
