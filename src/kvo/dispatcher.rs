//! # Change dispatcher.
//!
//! One [`Dispatcher`] per receiver. It owns the receiver's
//! [`BindingRegistry`], registers itself with each bound source as a
//! [`ChangeObserver`], and turns every accepted raw change into a
//! [`ChangeEvent`] delivered on the record's lane.
//!
//! ## Architecture
//! ```text
//! source ──RawChange──► Dispatcher::observe_change
//!                          │ lookup (source id, key path) under lock
//!                          │ upgrade weak source ── gone ──► prune, drop
//!                          ▼
//!                       ChangeEvent (seq, strong source)
//!                          │
//!                          ├─ Delivery::Post          ─► LaneBus::post(lane)
//!                          └─ Delivery::RunOrEnqueue  ─► LaneBus::run_or_enqueue(lane)
//!                                                          │
//!                                                          ▼
//!                                                 record.deliver(event)
//!                                                 (skipped if deactivated)
//! ```
//!
//! ## Rules
//! - One record per `(source, key path)`. The same key path may be bound on
//!   any number of sources at once.
//! - The state lock is never held while calling into a source or running an
//!   action.
//! - The registry is authoritative: a source that still calls a dispatcher it
//!   was unbound from finds no record and nothing happens.
//! - Records whose source has been dropped are swept whenever the registry
//!   is read or written, so counts never include them.
//! - Changes for one `(source, key path)` are posted in arrival order, so
//!   they run FIFO on the record's lane.
//! - Action panics are not caught here; the serial queue isolates them.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use super::event::{ChangeEvent, RawChange};
use super::record::{Delivery, ObservationRecord};
use super::registry::BindingRegistry;
use super::source::{ChangeObserver, ObjectId, Observable};
use crate::lanes::LaneBus;

/// Routes raw changes of one receiver's bound sources onto lanes.
pub struct Dispatcher {
    receiver: ObjectId,
    bus: Arc<LaneBus>,
    registry: Mutex<BindingRegistry>,
    me: Weak<Dispatcher>,
}

impl Dispatcher {
    /// Creates a dispatcher for `receiver` delivering through `bus`.
    pub fn new(receiver: ObjectId, bus: Arc<LaneBus>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            receiver,
            bus,
            registry: Mutex::new(BindingRegistry::new(receiver)),
            me: me.clone(),
        })
    }

    /// Receiver this dispatcher serves.
    pub fn receiver(&self) -> ObjectId {
        self.receiver
    }

    /// Bus used for delivery.
    pub fn bus(&self) -> &Arc<LaneBus> {
        &self.bus
    }

    /// Installs `record`, replacing whatever the receiver had bound to the
    /// same key path on the same source. Bindings of that key path on other
    /// sources are left alone. Returns `false` if an identical binding was
    /// already in place and nothing changed.
    pub fn add_binding(&self, source: &Arc<dyn Observable>, record: ObservationRecord) -> bool {
        let record = Arc::new(record);
        let key_path = Arc::clone(&record.key().key_path);

        let replaced = {
            let mut reg = self.live_registry();
            if reg
                .get_key(record.key())
                .is_some_and(|cur| cur.is_active() && cur.same_binding(&record))
            {
                trace!(
                    receiver = %self.receiver,
                    source = %record.source_id(),
                    key_path = %key_path,
                    "binding already in place"
                );
                return false;
            }
            reg.insert(Arc::clone(&record))
        };

        // Same source and key path: the observer registration carries over.
        if let Some(old) = &replaced {
            old.deactivate();
        }

        let observer: Weak<dyn ChangeObserver> = self.me.clone();
        source.add_observer(&key_path, observer);

        debug!(
            receiver = %self.receiver,
            source = %record.source_id(),
            key_path = %key_path,
            lane = %record.lane(),
            handler = record.action().name(),
            replaced = replaced.is_some(),
            "binding added"
        );
        true
    }

    /// Removes `record` if it is still installed. Returns `false` otherwise.
    pub fn remove_binding(&self, record: &Arc<ObservationRecord>) -> bool {
        let removed = {
            let mut reg = self.registry.lock();
            let installed = reg
                .get_key(record.key())
                .is_some_and(|r| Arc::ptr_eq(r, record));
            if installed {
                reg.remove(record.source_id(), record.key_path());
            }
            installed
        };
        record.deactivate();
        if removed {
            self.deregister(record);
        }
        removed
    }

    /// Removes every record bound to `key_path`, on every source. Returns
    /// `false` if there was none.
    pub fn remove_key(&self, key_path: &str) -> bool {
        let records = self.registry.lock().remove_key_path(key_path);
        for record in &records {
            record.deactivate();
            self.deregister(record);
        }
        !records.is_empty()
    }

    /// Removes every record. Returns how many were removed.
    pub fn clear_all(&self) -> usize {
        let records = self.registry.lock().drain();
        for record in &records {
            record.deactivate();
            self.deregister(record);
        }
        if !records.is_empty() {
            debug!(receiver = %self.receiver, removed = records.len(), "bindings cleared");
        }
        records.len()
    }

    /// The record bound to `key_path` on `source`.
    pub fn record(&self, source: ObjectId, key_path: &str) -> Option<Arc<ObservationRecord>> {
        self.live_registry().get(source, key_path).cloned()
    }

    /// Number of live records across all sources.
    pub fn len(&self) -> usize {
        self.live_registry().len()
    }

    /// `true` when no live record is bound.
    pub fn is_empty(&self) -> bool {
        self.live_registry().is_empty()
    }

    /// Bound key paths, sorted and without duplicates.
    pub fn key_paths(&self) -> Vec<String> {
        self.live_registry().key_paths()
    }

    /// Locks the registry after sweeping records whose source is gone.
    fn live_registry(&self) -> MutexGuard<'_, BindingRegistry> {
        let mut reg = self.registry.lock();
        for record in reg.retain_live() {
            record.deactivate();
            trace!(
                receiver = %self.receiver,
                source = %record.source_id(),
                key_path = %record.key_path(),
                "source gone, record swept"
            );
        }
        reg
    }

    fn deregister(&self, record: &ObservationRecord) {
        if let Some(source) = record.source() {
            source.remove_observer(record.key_path(), self.receiver);
        }
        trace!(
            receiver = %self.receiver,
            source = %record.source_id(),
            key_path = %record.key_path(),
            "binding removed"
        );
    }
}

impl ChangeObserver for Dispatcher {
    fn observer_id(&self) -> ObjectId {
        self.receiver
    }

    fn observe_change(&self, change: RawChange) {
        let record = self
            .registry
            .lock()
            .get(change.source_id(), change.key_path())
            .cloned();
        let Some(record) = record else {
            trace!(
                receiver = %self.receiver,
                source = %change.source_id(),
                key_path = change.key_path(),
                "no record for change"
            );
            return;
        };
        if !record.is_active() {
            return;
        }
        let Some(source) = record.source() else {
            drop(self.live_registry());
            return;
        };

        let event = Arc::new(ChangeEvent::from_raw(change, source));
        let lane = record.lane();
        let delivery = record.delivery();
        trace!(
            receiver = %self.receiver,
            key_path = event.key_path(),
            seq = event.seq,
            lane = %lane,
            "change accepted"
        );

        let job = move || record.deliver(&event);
        match delivery {
            Delivery::Post => self.bus.post(lane, job),
            Delivery::RunOrEnqueue => self.bus.run_or_enqueue(lane, job),
        }
    }
}
