//! Reactive value store.

use crate::error::StateError;
use crate::subscription::Unsubscribe;
use crate::types::SubscriptionId;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

use super::shape::Shape;

type Callback = Arc<dyn Fn(&Arc<Value>, &Arc<Value>) + Send + Sync>;
type Predicate = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// Decides whether a listener hears about a committed write.
#[derive(Clone, Default)]
pub enum Filter {
    /// Every committed write.
    #[default]
    Always,
    /// Writes for which `predicate(next, previous)` holds.
    Predicate(Predicate),
    /// Writes that change at least one of the named attributes.
    Attributes(Vec<String>),
}

impl Filter {
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        Filter::Predicate(Arc::new(predicate))
    }

    pub fn attributes<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Attributes(names.into_iter().map(Into::into).collect())
    }

    fn accepts(&self, next: &Value, previous: &Value) -> bool {
        match self {
            Filter::Always => true,
            Filter::Predicate(predicate) => predicate(next, previous),
            Filter::Attributes(names) => names
                .iter()
                .any(|name| next.get(name) != previous.get(name)),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Always => write!(f, "Always"),
            Filter::Predicate(_) => write!(f, "Predicate(..)"),
            Filter::Attributes(names) => f.debug_tuple("Attributes").field(names).finish(),
        }
    }
}

struct Listener {
    id: SubscriptionId,
    filter: Filter,
    callback: Callback,
}

struct StoreInner {
    shape: Shape,
    value: RwLock<Arc<Value>>,
    listeners: RwLock<Vec<Arc<Listener>>>,
    next_id: AtomicU64,
    /// Serializes read-merge-commit so concurrent writers never lose updates.
    write_lock: Mutex<()>,
}

/// A single value plus change notification.
///
/// The shape class (mapping, sequence or scalar) is picked from the
/// initial value and governs every later write; see [`Shape`]. Reads hand
/// out the committed `Arc<Value>`, which is never mutated in place.
///
/// Cloning a store yields another handle to the same value.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

impl StateStore {
    /// Create a store whose shape follows `initial`.
    pub fn new(initial: impl Into<Value>) -> Self {
        let initial = initial.into();
        let shape = Shape::of(&initial);
        Self::with_shape(shape, initial)
    }

    pub fn mapping(initial: serde_json::Map<String, Value>) -> Self {
        Self::with_shape(Shape::Mapping, Value::Object(initial))
    }

    pub fn sequence(initial: Vec<Value>) -> Self {
        Self::with_shape(Shape::Sequence, Value::Array(initial))
    }

    /// A replace-on-write store, even when `initial` is an object or array.
    pub fn scalar(initial: impl Into<Value>) -> Self {
        Self::with_shape(Shape::Scalar, initial.into())
    }

    fn with_shape(shape: Shape, initial: Value) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                shape,
                value: RwLock::new(Arc::new(initial)),
                listeners: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                write_lock: Mutex::new(()),
            }),
        }
    }

    pub fn shape(&self) -> Shape {
        self.inner.shape
    }

    /// The current committed value.
    pub fn read(&self) -> Arc<Value> {
        self.inner.value.read().clone()
    }

    /// Commit `candidate` according to the store's shape.
    ///
    /// Passing back the exact `Arc` returned by [`StateStore::read`] commits
    /// nothing. Any other candidate is committed and notifies listeners,
    /// even when the merged value equals the current one. Returns whether a
    /// write was committed.
    pub fn write(&self, candidate: impl Into<Arc<Value>>) -> Result<bool, StateError> {
        let candidate = candidate.into();
        let (next, previous) = {
            let _guard = self.inner.write_lock.lock();
            if Arc::ptr_eq(&self.read(), &candidate) {
                trace!("write passed back the current value");
                return Ok(false);
            }
            self.commit(Arc::unwrap_or_clone(candidate))?
        };
        self.notify(&next, &previous);
        Ok(true)
    }

    /// Compute the candidate from a deep copy of the current value.
    ///
    /// `updater` runs under the store's write lock and must not write to
    /// this store itself.
    pub fn write_with<F>(&self, updater: F) -> Result<bool, StateError>
    where
        F: FnOnce(Value) -> Value,
    {
        let (next, previous) = {
            let _guard = self.inner.write_lock.lock();
            let copy = Value::clone(&self.read());
            self.commit(updater(copy))?
        };
        self.notify(&next, &previous);
        Ok(true)
    }

    /// Must be called with `write_lock` held. Returns `(next, previous)`.
    fn commit(&self, candidate: Value) -> Result<(Arc<Value>, Arc<Value>), StateError> {
        let previous = self.read();
        let next = Arc::new(self.inner.shape.merge(&previous, candidate)?);
        *self.inner.value.write() = Arc::clone(&next);
        Ok((next, previous))
    }

    /// Runs after the write lock is released, so listeners may write back.
    fn notify(&self, next: &Arc<Value>, previous: &Arc<Value>) {
        let listeners = self.inner.listeners.read().clone();
        trace!(listeners = listeners.len(), "state committed");
        for listener in listeners {
            if listener.filter.accepts(next, previous) {
                (listener.callback)(next, previous);
            }
        }
    }

    /// Call `listener(next, previous)` after every committed write that
    /// passes `filter`.
    pub fn subscribe<F>(&self, listener: F, filter: Filter) -> Unsubscribe
    where
        F: Fn(&Arc<Value>, &Arc<Value>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.inner.listeners.write().push(Arc::new(Listener {
            id,
            filter,
            callback: Arc::new(listener),
        }));
        debug!(subscription = %id, "state listener added");

        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.write().retain(|l| l.id != id);
                debug!(subscription = %id, "state listener removed");
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("shape", &self.inner.shape)
            .field("value", &self.read())
            .finish()
    }
}
