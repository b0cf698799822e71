//! Global state store.
//!
//! One immutable state tree, partitioned into namespaces owned by
//! independent capabilities. All mutation goes through [`StateStore::update`]
//! as whole-tree replacement, so any two snapshots taken between mutations
//! are the same `Arc` and can be compared by identity.
//!
//! Updates are strictly serialized. An `update` issued from inside a
//! subscriber callback is queued and applied after the in-flight update has
//! finished notifying, never interleaved, so no write is ever lost.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::metadata::ModuleMetadata;
use crate::search::{RegistryState, SearchState};

/// The single immutable state tree shared by the host and all modules.
///
/// Each field is a namespace owned by exactly one capability (or by the host,
/// for `modules`). Capabilities never write outside their own namespace.
#[derive(Clone, Default)]
pub struct GlobalState {
    /// Search input and accumulated results (search capability).
    pub search: SearchState,

    /// Registered search providers (search capability).
    pub registry: RegistryState,

    /// Per-instance state slices, keyed by container id (containers
    /// capability).
    pub containers: HashMap<String, Value>,

    /// Metadata of every currently installed module (host).
    pub modules: Vec<ModuleMetadata>,
}

/// Handle for removing a subscriber.
pub type SubscriptionId = u64;

type UpdateFn = Box<dyn FnOnce(&GlobalState) -> GlobalState + Send>;
type Listener = Arc<dyn Fn(&Arc<GlobalState>) + Send + Sync>;

struct Inner {
    state: Arc<GlobalState>,
    queue: VecDeque<UpdateFn>,
    /// Set while some caller is draining the queue; reentrant updates only
    /// enqueue and return.
    applying: bool,
}

/// Atomic read / swap-style update / subscription over [`GlobalState`].
pub struct StateStore {
    inner: Mutex<Inner>,
    subscribers: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

impl StateStore {
    /// Create a store holding the given initial state.
    pub fn new(initial: GlobalState) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: Arc::new(initial),
                queue: VecDeque::new(),
                applying: false,
            }),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        })
    }

    /// Current snapshot.
    pub fn read(&self) -> Arc<GlobalState> {
        self.inner.lock().unwrap().state.clone()
    }

    /// Apply `f` to the latest snapshot, replace the whole tree with its
    /// result, and notify all subscribers synchronously in subscription
    /// order.
    ///
    /// If called reentrantly from a subscriber, the update is queued behind
    /// the one currently being applied.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&GlobalState) -> GlobalState + Send + 'static,
    {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.queue.push_back(Box::new(f));
            if inner.applying {
                return;
            }
            inner.applying = true;
        }

        loop {
            // The lock is not held while notifying, so listeners may read,
            // update, and (un)subscribe freely.
            let snapshot = {
                let mut inner = self.inner.lock().unwrap();
                match inner.queue.pop_front() {
                    Some(apply) => {
                        let next = apply(&inner.state);
                        inner.state = Arc::new(next);
                        Some(inner.state.clone())
                    }
                    None => {
                        inner.applying = false;
                        None
                    }
                }
            };

            match snapshot {
                Some(snapshot) => self.notify(&snapshot),
                None => break,
            }
        }
    }

    /// Register a listener called after every applied update.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Arc<GlobalState>) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a previously registered listener.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|(sub, _)| *sub != id);
    }

    fn notify(&self, snapshot: &Arc<GlobalState>) {
        let listeners: Vec<Listener> = self
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn store() -> Arc<StateStore> {
        StateStore::new(GlobalState::default())
    }

    #[test]
    fn update_applies_function_to_prior_snapshot() {
        let store = store();

        store.update(|state| {
            let mut next = state.clone();
            next.search.input = "a".to_string();
            next
        });
        store.update(|state| {
            let mut next = state.clone();
            next.search.input = format!("{}b", next.search.input);
            next
        });

        assert_eq!(store.read().search.input, "ab");
    }

    #[test]
    fn snapshots_between_updates_are_identical() {
        let store = store();
        store.update(|state| state.clone());

        let a = store.read();
        let b = store.read();
        assert!(Arc::ptr_eq(&a, &b));

        store.update(|state| state.clone());
        let c = store.read();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn subscribers_notified_in_subscription_order() {
        let store = store();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            store.subscribe(move |_| order.lock().unwrap().push(tag));
        }

        store.update(|state| state.clone());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let id = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.update(|state| state.clone());
        store.unsubscribe(id);
        store.update(|state| state.clone());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reentrant_updates_queue_without_losing_writes() {
        let store = store();

        // A subscriber that reacts to the first write by issuing another one.
        let reacting = store.clone();
        let fired = Arc::new(AtomicUsize::new(0));
        let once = fired.clone();
        store.subscribe(move |snapshot| {
            if snapshot.search.input == "outer" && once.fetch_add(1, Ordering::SeqCst) == 0 {
                reacting.update(|state| {
                    let mut next = state.clone();
                    next.search.input = format!("{}+inner", next.search.input);
                    next
                });
            }
        });

        store.update(|state| {
            let mut next = state.clone();
            next.search.input = "outer".to_string();
            next
        });

        // The inner update saw the outer one's result, not a stale tree.
        assert_eq!(store.read().search.input, "outer+inner");
    }

    #[test]
    fn listener_sees_snapshot_of_each_update() {
        let store = store();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        store.subscribe(move |snapshot| {
            sink.lock().unwrap().push(snapshot.search.input.clone());
        });

        for input in ["one", "two"] {
            let input = input.to_string();
            store.update(move |state| {
                let mut next = state.clone();
                next.search.input = input;
                next
            });
        }

        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    }
}
