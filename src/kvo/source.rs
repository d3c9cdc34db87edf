//! # Observation boundary with the host object model.
//!
//! The host's native property-observation mechanism is an external
//! collaborator. This module fixes the shape of that boundary:
//!
//! - [`Observable`] is implemented by sources; the binder registers and
//!   deregisters interest through it.
//! - [`ChangeObserver`] is implemented by the [`Dispatcher`](crate::Dispatcher);
//!   the host calls it with a [`RawChange`] for every change.
//! - [`ObserverList`] is a ready-made weak observer table a source can embed
//!   to implement both halves.
//!
//! ## Rules
//! - Sources hold observers **weakly**; a dispatcher that went away is pruned
//!   on the next notification.
//! - The observer table lock is never held while calling an observer.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::event::RawChange;

/// Global counter for object identities.
static OBJECT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a source or receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocates a fresh, process-unique identity.
    pub fn next() -> Self {
        ObjectId(OBJECT_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Runtime type of a source, the key the auto-bind resolver matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceType {
    id: TypeId,
    name: &'static str,
}

impl SourceType {
    /// Source type of `S`.
    pub fn of<S: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<S>(),
            name: std::any::type_name::<S>(),
        }
    }

    /// Returns `true` if this is the type `S`.
    pub fn is<S: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<S>()
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// An object whose properties can be observed by key path.
pub trait Observable: Send + Sync + 'static {
    /// Stable identity; must not change for the object's lifetime.
    fn object_id(&self) -> ObjectId;

    /// Starts delivering changes of `key_path` to `observer`.
    ///
    /// Adding an observer that is already registered for the key path must
    /// not produce duplicate notifications.
    fn add_observer(&self, key_path: &str, observer: Weak<dyn ChangeObserver>);

    /// Stops delivering changes of `key_path` to the observer with this id.
    fn remove_observer(&self, key_path: &str, observer: ObjectId);
}

/// Receives raw change signals from the host mechanism.
pub trait ChangeObserver: Send + Sync {
    /// Identity used for de-duplication and removal.
    fn observer_id(&self) -> ObjectId;

    /// Called once per change, on whatever thread the change happened.
    fn observe_change(&self, change: RawChange);
}

type Entry = (ObjectId, Weak<dyn ChangeObserver>);

/// Thread-safe weak observer table, keyed by key path.
pub struct ObserverList {
    id: ObjectId,
    observers: Mutex<HashMap<Arc<str>, Vec<Entry>>>,
}

impl ObserverList {
    /// Creates an empty table with a fresh [`ObjectId`] for its owner.
    pub fn new() -> Self {
        Self {
            id: ObjectId::next(),
            observers: Mutex::new(HashMap::new()),
        }
    }

    /// Identity of the owning source.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Registers `observer` for `key_path`, replacing an existing entry with
    /// the same observer id.
    pub fn add(&self, key_path: &str, observer: Weak<dyn ChangeObserver>) {
        let Some(live) = observer.upgrade() else {
            return;
        };
        let oid = live.observer_id();
        drop(live);

        let mut map = self.observers.lock();
        let list = map.entry(Arc::from(key_path)).or_default();
        list.retain(|(id, w)| *id != oid && w.strong_count() > 0);
        list.push((oid, observer));
    }

    /// Deregisters the observer `oid` from `key_path`.
    pub fn remove(&self, key_path: &str, oid: ObjectId) {
        let mut map = self.observers.lock();
        if let Some(list) = map.get_mut(key_path) {
            list.retain(|(id, _)| *id != oid);
            if list.is_empty() {
                map.remove(key_path);
            }
        }
    }

    /// Number of live observers registered for `key_path`.
    pub fn observer_count(&self, key_path: &str) -> usize {
        self.observers
            .lock()
            .get(key_path)
            .map(|list| list.iter().filter(|(_, w)| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Delivers `change` to every live observer of its key path.
    pub fn notify(&self, change: RawChange) {
        let targets: Vec<Arc<dyn ChangeObserver>> = {
            let mut map = self.observers.lock();
            let Some(list) = map.get_mut(change.key_path()) else {
                return;
            };
            list.retain(|(_, w)| w.strong_count() > 0);
            list.iter().filter_map(|(_, w)| w.upgrade()).collect()
        };

        let Some((last, rest)) = targets.split_last() else {
            return;
        };
        for observer in rest {
            observer.observe_change(change.clone());
        }
        last.observe_change(change);
    }
}

impl Default for ObserverList {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("id", &self.id)
            .field("key_paths", &self.observers.lock().len())
            .finish()
    }
}
