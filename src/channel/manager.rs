//! Topic-indexed dispatcher.

use crate::subscription::Unsubscribe;
use crate::types::SubscriptionId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

use super::types::{split_alternatives, Payload, Topic, Topics};

type Handler<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Internal subscription state.
struct Subscription<P> {
    id: SubscriptionId,
    topics: Topics,
    handler: Handler<P>,
    once: bool,
    /// Cleared on removal; a handler removed mid-dispatch is skipped.
    active: AtomicBool,
}

/// Subscriptions plus the name index.
struct Registry<P> {
    subscriptions: BTreeMap<SubscriptionId, Arc<Subscription<P>>>,
    /// Exact-name matchers, by name.
    by_name: HashMap<String, Vec<SubscriptionId>>,
    /// Subscriptions holding at least one regex matcher.
    patterns: Vec<SubscriptionId>,
    closed: bool,
}

impl<P> Registry<P> {
    fn new() -> Self {
        Self {
            subscriptions: BTreeMap::new(),
            by_name: HashMap::new(),
            patterns: Vec::new(),
            closed: false,
        }
    }

    fn insert(&mut self, sub: Arc<Subscription<P>>) {
        let mut has_pattern = false;
        for topic in sub.topics.iter() {
            match topic {
                Topic::Name(name) => {
                    let ids = self.by_name.entry(name.clone()).or_default();
                    if !ids.contains(&sub.id) {
                        ids.push(sub.id);
                    }
                }
                Topic::Pattern(_) => has_pattern = true,
            }
        }
        if has_pattern {
            self.patterns.push(sub.id);
        }
        self.subscriptions.insert(sub.id, sub);
    }

    fn remove(&mut self, id: SubscriptionId) -> Option<Arc<Subscription<P>>> {
        let sub = self.subscriptions.remove(&id)?;
        sub.active.store(false, Ordering::Release);

        for topic in sub.topics.iter() {
            if let Topic::Name(name) = topic {
                if let Some(ids) = self.by_name.get_mut(name) {
                    ids.retain(|other| *other != id);
                    if ids.is_empty() {
                        self.by_name.remove(name);
                    }
                }
            }
        }
        self.patterns.retain(|other| *other != id);

        Some(sub)
    }

    fn clear(&mut self) {
        for sub in self.subscriptions.values() {
            sub.active.store(false, Ordering::Release);
        }
        self.subscriptions.clear();
        self.by_name.clear();
        self.patterns.clear();
    }

    /// Matching subscriptions, in registration order.
    fn matching(&self, alternatives: &[&str]) -> Vec<Arc<Subscription<P>>> {
        let mut ids = BTreeSet::new();

        for alt in alternatives {
            if let Some(named) = self.by_name.get(*alt) {
                ids.extend(named.iter().copied());
            }
        }

        for id in &self.patterns {
            if let Some(sub) = self.subscriptions.get(id) {
                if sub.topics.matches(alternatives) {
                    ids.insert(*id);
                }
            }
        }

        ids.into_iter()
            .filter_map(|id| self.subscriptions.get(&id).cloned())
            .collect()
    }
}

struct Inner<P> {
    registry: RwLock<Registry<P>>,
    next_id: AtomicU64,
}

impl<P> Inner<P> {
    fn remove(&self, id: SubscriptionId) {
        if self.registry.write().remove(id).is_some() {
            debug!(subscription = %id, "channel subscription removed");
        }
    }
}

/// Named-event dispatcher.
///
/// Handlers run synchronously on the emitting thread, in registration
/// order, before [`Channel::emit`] returns. No lock is held while a handler
/// runs, so handlers may emit, subscribe and unsubscribe freely;
/// subscriptions added during a dispatch do not see the in-flight event.
///
/// Cloning a channel yields another handle to the same subscriber set.
pub struct Channel<P: Payload> {
    inner: Arc<Inner<P>>,
}

impl<P: Payload> Clone for Channel<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Payload> Channel<P> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(Registry::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `handler` for every topic in `topics`.
    pub fn on<F>(&self, topics: impl Into<Topics>, handler: F) -> Unsubscribe
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.register(topics.into(), Arc::new(handler), false)
    }

    /// Like [`Channel::on`], but the subscription is removed before its
    /// first invocation.
    pub fn once<F>(&self, topics: impl Into<Topics>, handler: F) -> Unsubscribe
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.register(topics.into(), Arc::new(handler), true)
    }

    fn register(&self, topics: Topics, handler: Handler<P>, once: bool) -> Unsubscribe {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let sub = Arc::new(Subscription {
            id,
            topics,
            handler,
            once,
            active: AtomicBool::new(true),
        });

        {
            let mut registry = self.inner.registry.write();
            if registry.closed {
                debug!("subscribe on a closed channel ignored");
                return Unsubscribe::noop();
            }
            registry.insert(sub);
        }
        debug!(subscription = %id, once, "channel subscription added");

        let weak: Weak<Inner<P>> = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(id);
            }
        })
    }

    /// Dispatch `payload` to every subscription matching `topic`.
    ///
    /// `topic` may carry alternatives separated by `|` or `,`. An error
    /// payload that has already been announced is not dispatched again;
    /// such a call returns `true` without invoking anything. Returns
    /// `false` only after [`Channel::shutdown`].
    pub fn emit(&self, topic: &str, payload: P) -> bool {
        let alternatives: Vec<&str> = split_alternatives(topic).collect();

        let matched = {
            let registry = self.inner.registry.read();
            if registry.closed {
                return false;
            }
            registry.matching(&alternatives)
        };

        if let Some(mark) = payload.propagation() {
            if mark.mark() {
                trace!(topic, "error already propagated, skipping dispatch");
                return true;
            }
        }

        trace!(topic, handlers = matched.len(), "dispatching");
        for sub in matched {
            if sub.once {
                // Whoever clears the flag first owns the single invocation.
                if !sub.active.swap(false, Ordering::AcqRel) {
                    continue;
                }
                self.inner.remove(sub.id);
            } else if !sub.active.load(Ordering::Acquire) {
                continue;
            }
            (sub.handler)(&payload);
        }

        true
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.read().subscriptions.len()
    }

    /// Drop every subscription; later emits return `false` and later
    /// subscriptions are ignored.
    pub fn shutdown(&self) {
        let mut registry = self.inner.registry.write();
        registry.closed = true;
        registry.clear();
        debug!("channel shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.registry.read().closed
    }
}

impl<P: Payload> Default for Channel<P> {
    fn default() -> Self {
        Self::new()
    }
}
