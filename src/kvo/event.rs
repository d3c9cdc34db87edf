//! # Change payloads.
//!
//! [`RawChange`] is what the host mechanism hands to a
//! [`ChangeObserver`](super::ChangeObserver): source identity, key path, old
//! and new value, and collection-mutation metadata. The dispatcher turns it
//! into an immutable [`ChangeEvent`] that also owns the source for the
//! event's lifetime.
//!
//! ## Ordering guarantees
//! Each `ChangeEvent` carries a globally unique, monotonically increasing
//! `seq`, assigned when the dispatcher accepts the raw change.
//!
//! ## Example
//! ```rust
//! use lanekvo::{MutationKind, ObjectId, RawChange};
//!
//! let raw = RawChange::new(ObjectId::next(), "items")
//!     .with_old(vec![1, 2])
//!     .with_new(vec![1, 2, 3])
//!     .with_mutation(MutationKind::Insertion, [2]);
//!
//! assert_eq!(raw.key_path(), "items");
//! assert_eq!(raw.mutation().map(|m| m.kind), Some(MutationKind::Insertion));
//! ```

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use super::source::{ObjectId, Observable};

/// Global sequence counter for change events.
static CHANGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Type-erased property value.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Kind of change applied to a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// The whole value was replaced.
    Setting,
    /// Elements were inserted into a collection.
    Insertion,
    /// Elements were removed from a collection.
    Removal,
    /// Elements of a collection were replaced in place.
    Replacement,
}

/// Collection-mutation metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// What kind of mutation happened.
    pub kind: MutationKind,
    /// Affected indexes, ascending.
    pub indexes: BTreeSet<usize>,
}

/// A change as reported by the host mechanism.
#[derive(Clone)]
pub struct RawChange {
    source_id: ObjectId,
    key_path: Arc<str>,
    old_value: Option<Value>,
    new_value: Option<Value>,
    mutation: Option<Mutation>,
    prior: bool,
}

impl RawChange {
    /// Creates a change of `key_path` on the source `source_id` with no values.
    pub fn new(source_id: ObjectId, key_path: impl Into<Arc<str>>) -> Self {
        Self {
            source_id,
            key_path: key_path.into(),
            old_value: None,
            new_value: None,
            mutation: None,
            prior: false,
        }
    }

    /// Attaches the previous value.
    #[inline]
    pub fn with_old<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.old_value = Some(Arc::new(value));
        self
    }

    /// Attaches the new value.
    #[inline]
    pub fn with_new<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.new_value = Some(Arc::new(value));
        self
    }

    /// Attaches an already type-erased previous value.
    #[inline]
    pub fn with_old_value(mut self, value: Option<Value>) -> Self {
        self.old_value = value;
        self
    }

    /// Attaches an already type-erased new value.
    #[inline]
    pub fn with_new_value(mut self, value: Option<Value>) -> Self {
        self.new_value = value;
        self
    }

    /// Attaches collection-mutation metadata.
    #[inline]
    pub fn with_mutation(
        mut self,
        kind: MutationKind,
        indexes: impl IntoIterator<Item = usize>,
    ) -> Self {
        self.mutation = Some(Mutation {
            kind,
            indexes: indexes.into_iter().collect(),
        });
        self
    }

    /// Marks this as the notification sent before the change is applied.
    #[inline]
    pub fn with_prior(mut self) -> Self {
        self.prior = true;
        self
    }

    /// Identity of the changed source.
    pub fn source_id(&self) -> ObjectId {
        self.source_id
    }

    /// Changed key path.
    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    /// Collection-mutation metadata, if any.
    pub fn mutation(&self) -> Option<&Mutation> {
        self.mutation.as_ref()
    }
}

impl fmt::Debug for RawChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawChange")
            .field("source_id", &self.source_id)
            .field("key_path", &self.key_path)
            .field("has_old", &self.old_value.is_some())
            .field("has_new", &self.new_value.is_some())
            .field("mutation", &self.mutation)
            .field("prior", &self.prior)
            .finish()
    }
}

/// Immutable notification delivered to a bound action.
///
/// Owns a strong reference to the source, so the source cannot disappear
/// before delivery completes.
pub struct ChangeEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    key_path: Arc<str>,
    source: Arc<dyn Observable>,
    old_value: Option<Value>,
    new_value: Option<Value>,
    mutation: Option<Mutation>,
    prior: bool,
}

impl ChangeEvent {
    pub(crate) fn from_raw(raw: RawChange, source: Arc<dyn Observable>) -> Self {
        Self {
            seq: CHANGE_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            key_path: raw.key_path,
            source,
            old_value: raw.old_value,
            new_value: raw.new_value,
            mutation: raw.mutation,
            prior: raw.prior,
        }
    }

    /// Changed key path.
    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    /// Originating source.
    pub fn source(&self) -> &Arc<dyn Observable> {
        &self.source
    }

    /// Identity of the originating source.
    pub fn source_id(&self) -> ObjectId {
        self.source.object_id()
    }

    /// New value, type-erased.
    pub fn new_value(&self) -> Option<&Value> {
        self.new_value.as_ref()
    }

    /// Previous value, type-erased.
    pub fn old_value(&self) -> Option<&Value> {
        self.old_value.as_ref()
    }

    /// New value downcast to `T`; `None` if absent or of another type.
    pub fn new_as<T: Any>(&self) -> Option<&T> {
        self.new_value.as_deref().and_then(|v| v.downcast_ref::<T>())
    }

    /// Previous value downcast to `T`; `None` if absent or of another type.
    pub fn old_as<T: Any>(&self) -> Option<&T> {
        self.old_value.as_deref().and_then(|v| v.downcast_ref::<T>())
    }

    /// Collection-mutation metadata, if the property is a collection.
    pub fn mutation(&self) -> Option<&Mutation> {
        self.mutation.as_ref()
    }

    /// `true` for the before-change notification.
    pub fn is_prior(&self) -> bool {
        self.prior
    }
}

impl fmt::Debug for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeEvent")
            .field("seq", &self.seq)
            .field("key_path", &self.key_path)
            .field("source", &self.source.object_id())
            .field("mutation", &self.mutation)
            .field("prior", &self.prior)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvo::source::ObserverList;
    use std::sync::Weak;

    struct Dummy(ObserverList);

    impl Observable for Dummy {
        fn object_id(&self) -> ObjectId {
            self.0.id()
        }
        fn add_observer(&self, _: &str, _: Weak<dyn crate::ChangeObserver>) {}
        fn remove_observer(&self, _: &str, _: ObjectId) {}
    }

    #[test]
    fn test_event_typed_accessors() {
        let src: Arc<dyn Observable> = Arc::new(Dummy(ObserverList::new()));
        let raw = RawChange::new(src.object_id(), "score").with_old(0i64).with_new(10i64);
        let ev = ChangeEvent::from_raw(raw, Arc::clone(&src));

        assert_eq!(ev.key_path(), "score");
        assert_eq!(ev.old_as::<i64>(), Some(&0));
        assert_eq!(ev.new_as::<i64>(), Some(&10));
        assert_eq!(ev.new_as::<String>(), None);
        assert_eq!(ev.source_id(), src.object_id());
        assert!(ev.mutation().is_none());
        assert!(!ev.is_prior());
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let src: Arc<dyn Observable> = Arc::new(Dummy(ObserverList::new()));
        let a = ChangeEvent::from_raw(RawChange::new(src.object_id(), "k"), Arc::clone(&src));
        let b = ChangeEvent::from_raw(RawChange::new(src.object_id(), "k"), src);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_mutation_indexes_sorted() {
        let raw = RawChange::new(ObjectId::next(), "items")
            .with_mutation(MutationKind::Removal, [5, 1, 3])
            .with_prior();
        let m = raw.mutation().unwrap();
        assert_eq!(m.kind, MutationKind::Removal);
        assert_eq!(m.indexes.iter().copied().collect::<Vec<_>>(), vec![1, 3, 5]);
    }
}
