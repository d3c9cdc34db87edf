//! # Per-receiver binding registry.
//!
//! Holds the receiver's live records, indexed by source identity and then by
//! key path. A receiver binds at most one record per `(source, key path)`;
//! binding the same pair again replaces the previous record. One key path may
//! be bound on several sources at once.
//!
//! The registry is plain data. Locking and source registration are the
//! [`Dispatcher`](crate::Dispatcher)'s job.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::record::{ObservationRecord, RecordKey};
use super::source::ObjectId;

/// Records owned by one receiver.
#[derive(Debug)]
pub struct BindingRegistry {
    receiver: ObjectId,
    by_source: HashMap<ObjectId, HashMap<Arc<str>, Arc<ObservationRecord>>>,
}

impl BindingRegistry {
    /// Creates an empty registry for `receiver`.
    pub fn new(receiver: ObjectId) -> Self {
        Self {
            receiver,
            by_source: HashMap::new(),
        }
    }

    /// Owning receiver.
    pub fn receiver(&self) -> ObjectId {
        self.receiver
    }

    /// Stores `record` under its `(source, key path)` and returns the record
    /// it replaced.
    pub fn insert(&mut self, record: Arc<ObservationRecord>) -> Option<Arc<ObservationRecord>> {
        let source = record.source_id();
        let key_path = Arc::clone(&record.key().key_path);
        self.by_source.entry(source).or_default().insert(key_path, record)
    }

    /// The record bound to `key_path` on `source`.
    pub fn get(&self, source: ObjectId, key_path: &str) -> Option<&Arc<ObservationRecord>> {
        self.by_source.get(&source)?.get(key_path)
    }

    /// The record with identity `key`.
    pub fn get_key(&self, key: &RecordKey) -> Option<&Arc<ObservationRecord>> {
        if key.receiver != self.receiver {
            return None;
        }
        self.get(key.source, &key.key_path)
    }

    /// Removes the record bound to `key_path` on `source`.
    pub fn remove(&mut self, source: ObjectId, key_path: &str) -> Option<Arc<ObservationRecord>> {
        let keys = self.by_source.get_mut(&source)?;
        let removed = keys.remove(key_path);
        if keys.is_empty() {
            self.by_source.remove(&source);
        }
        removed
    }

    /// Removes every record bound to `key_path`, whatever the source.
    pub fn remove_key_path(&mut self, key_path: &str) -> Vec<Arc<ObservationRecord>> {
        let mut removed = Vec::new();
        self.by_source.retain(|_, keys| {
            if let Some(r) = keys.remove(key_path) {
                removed.push(r);
            }
            !keys.is_empty()
        });
        removed
    }

    /// Removes every record whose source has been dropped and returns them.
    pub fn retain_live(&mut self) -> Vec<Arc<ObservationRecord>> {
        let mut dead = Vec::new();
        self.by_source.retain(|_, keys| {
            keys.retain(|_, r| {
                let alive = r.source_alive();
                if !alive {
                    dead.push(Arc::clone(r));
                }
                alive
            });
            !keys.is_empty()
        });
        dead
    }

    /// Removes and returns every record.
    pub fn drain(&mut self) -> Vec<Arc<ObservationRecord>> {
        self.by_source
            .drain()
            .flat_map(|(_, keys)| keys.into_values())
            .collect()
    }

    /// Number of records across all sources.
    pub fn len(&self) -> usize {
        self.by_source.values().map(HashMap::len).sum()
    }

    /// `true` when no record is bound.
    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    /// Distinct bound key paths, sorted.
    pub fn key_paths(&self) -> Vec<String> {
        self.by_source
            .values()
            .flat_map(|keys| keys.keys())
            .map(|k| k.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
