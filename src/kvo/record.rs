//! # Observation records.
//!
//! One [`ObservationRecord`] is one live binding: which source, which key
//! path, what to run and on which lane. Records live in the receiver's
//! [`BindingRegistry`](crate::BindingRegistry) under their [`RecordKey`].
//!
//! ## Rules
//! - The source is held **weakly**. A record never keeps its source alive.
//! - A deactivated record never runs its action again, even for events
//!   already queued on its lane.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::trace;

use super::action::Action;
use super::event::ChangeEvent;
use super::source::{ObjectId, Observable};
use crate::lanes::Lane;

/// How an accepted change is scheduled onto the record's lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Delivery {
    /// Always enqueue on the lane, even when already on it.
    #[default]
    Post,
    /// Run in place when the change is raised on the lane's own queue,
    /// otherwise enqueue.
    RunOrEnqueue,
}

/// Identity of a binding: `(receiver, source, key path)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Receiver owning the binding.
    pub receiver: ObjectId,
    /// Observed source.
    pub source: ObjectId,
    /// Observed key path.
    pub key_path: Arc<str>,
}

/// A live binding of one key path on one source.
pub struct ObservationRecord {
    key: RecordKey,
    source: Weak<dyn Observable>,
    action: Action,
    lane: Lane,
    delivery: Delivery,
    active: AtomicBool,
}

impl ObservationRecord {
    /// Creates an active record binding `key_path` on `source` to `action`.
    pub fn new(
        receiver: ObjectId,
        source: &Arc<dyn Observable>,
        key_path: impl Into<Arc<str>>,
        action: Action,
        lane: Lane,
        delivery: Delivery,
    ) -> Self {
        Self {
            key: RecordKey {
                receiver,
                source: source.object_id(),
                key_path: key_path.into(),
            },
            source: Arc::downgrade(source),
            action,
            lane,
            delivery,
            active: AtomicBool::new(true),
        }
    }

    /// Identity `(receiver, source, key path)`.
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Observed key path.
    pub fn key_path(&self) -> &str {
        &self.key.key_path
    }

    /// Identity of the observed source.
    pub fn source_id(&self) -> ObjectId {
        self.key.source
    }

    /// The source, if it is still alive.
    pub fn source(&self) -> Option<Arc<dyn Observable>> {
        self.source.upgrade()
    }

    /// `false` once the source has been dropped.
    #[inline]
    pub fn source_alive(&self) -> bool {
        self.source.strong_count() > 0
    }

    /// Lane the action runs on.
    pub fn lane(&self) -> Lane {
        self.lane
    }

    /// How delivery is scheduled onto the lane.
    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    /// What runs on each change.
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// `false` once the record has been unbound.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Permanently disables the record.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Hash of the record's identity `(receiver, source, key path)`.
    pub fn identity_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.key.hash(&mut h);
        h.finish()
    }

    /// `true` if `other` binds the same key on the same source to the same
    /// handler on the same lane.
    pub fn same_binding(&self, other: &ObservationRecord) -> bool {
        self.key == other.key
            && self.lane == other.lane
            && self.delivery == other.delivery
            && self.action.same_target(&other.action)
    }

    /// Runs the action for `event` if the record is still active.
    pub(crate) fn deliver(&self, event: &ChangeEvent) {
        if !self.is_active() {
            trace!(key_path = %self.key.key_path, seq = event.seq, "record inactive, dropping event");
            return;
        }
        if !self.action.invoke(event) {
            trace!(
                key_path = %self.key.key_path,
                handler = self.action.name(),
                "receiver gone, dropping event"
            );
        }
    }
}

impl fmt::Debug for ObservationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationRecord")
            .field("key", &self.key)
            .field("action", &self.action)
            .field("lane", &self.lane)
            .field("delivery", &self.delivery)
            .field("active", &self.is_active())
            .finish()
    }
}
