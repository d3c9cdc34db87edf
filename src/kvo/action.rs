//! # Action targets.
//!
//! An [`Action`] is what a record runs when its key path changes: either a
//! handler method bound to a receiver ([`MethodRef`]) or an inline closure.
//! Both are invoked through [`Action::invoke`].
//!
//! A `MethodRef` holds its receiver weakly, so a receiver that owns the
//! binder holding the record does not keep itself alive.

use std::fmt;
use std::sync::{Arc, Weak};

use super::event::ChangeEvent;

/// Inline callback.
pub type NotifyFn = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

type Thunk = Arc<dyn Fn(&ChangeEvent) -> bool + Send + Sync>;

/// Handler method bound to a specific receiver instance.
#[derive(Clone)]
pub struct MethodRef {
    name: &'static str,
    call: Thunk,
}

impl MethodRef {
    /// Binds `handler` to the receiver behind `receiver`.
    pub fn new<R>(receiver: Weak<R>, name: &'static str, handler: fn(&R, &ChangeEvent)) -> Self
    where
        R: Send + Sync + 'static,
    {
        let call: Thunk = Arc::new(move |event: &ChangeEvent| match receiver.upgrade() {
            Some(r) => {
                handler(&r, event);
                true
            }
            None => false,
        });
        Self { name, call }
    }

    /// Handler identifier.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// What a record does when notified.
#[derive(Clone)]
pub enum Action {
    /// Handler method on a receiver.
    Method(MethodRef),
    /// Inline callback.
    Closure(NotifyFn),
}

impl Action {
    /// Wraps a closure.
    pub fn closure<F>(f: F) -> Self
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        Action::Closure(Arc::new(f))
    }

    /// Identifier for logs; closures report `"<closure>"`.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Method(m) => m.name(),
            Action::Closure(_) => "<closure>",
        }
    }

    /// Runs the action. Returns `false` when the receiver is gone and nothing ran.
    pub fn invoke(&self, event: &ChangeEvent) -> bool {
        match self {
            Action::Method(m) => (m.call)(event),
            Action::Closure(f) => {
                f(event);
                true
            }
        }
    }

    /// Two actions are the same binding target when they name the same
    /// handler method. Closures are never considered equal.
    pub(crate) fn same_target(&self, other: &Action) -> bool {
        match (self, other) {
            (Action::Method(a), Action::Method(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Method(m) => f.debug_tuple("Method").field(&m.name).finish(),
            Action::Closure(_) => f.write_str("Closure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvo::event::RawChange;
    use crate::kvo::source::{ChangeObserver, ObjectId, Observable, ObserverList};
    use parking_lot::Mutex;

    struct Src(ObserverList);

    impl Observable for Src {
        fn object_id(&self) -> ObjectId {
            self.0.id()
        }
        fn add_observer(&self, _: &str, _: Weak<dyn ChangeObserver>) {}
        fn remove_observer(&self, _: &str, _: ObjectId) {}
    }

    struct Recv {
        hits: Mutex<u32>,
    }

    impl Recv {
        fn on_score(&self, _ev: &ChangeEvent) {
            *self.hits.lock() += 1;
        }
    }

    fn event() -> ChangeEvent {
        let src: Arc<dyn Observable> = Arc::new(Src(ObserverList::new()));
        ChangeEvent::from_raw(RawChange::new(src.object_id(), "score"), src)
    }

    #[test]
    fn test_method_ref_skips_dead_receiver() {
        let r = Arc::new(Recv { hits: Mutex::new(0) });
        let action = Action::Method(MethodRef::new(Arc::downgrade(&r), "on_score", Recv::on_score));
        let ev = event();

        assert!(action.invoke(&ev));
        assert_eq!(*r.hits.lock(), 1);

        drop(r);
        assert!(!action.invoke(&ev));
    }

    #[test]
    fn test_same_target() {
        let r = Arc::new(Recv { hits: Mutex::new(0) });
        let a = Action::Method(MethodRef::new(Arc::downgrade(&r), "on_score", Recv::on_score));
        let b = a.clone();
        let c = Action::closure(|_| {});
        assert!(a.same_target(&b));
        assert!(!a.same_target(&c));
        assert!(!c.same_target(&c.clone()));
        assert_eq!(c.name(), "<closure>");
    }
}
