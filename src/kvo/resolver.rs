//! # Auto-bind resolution.
//!
//! Handler discovery is a pure function of `(receiver type, source type)`:
//! given a source type, a receiver lists the `(key path, handler, lane)`
//! triples it wants bound.
//!
//! - [`AutoBind`] is the static declaration a receiver type implements,
//!   usually through [`auto_bind!`](crate::auto_bind).
//! - [`Resolve`] is the injectable form; [`Declared`] adapts an `AutoBind`
//!   receiver to it. Tests and hosts with generated tables supply their own.
//!
//! ## Example
//! ```rust
//! use std::sync::Weak;
//! use lanekvo::{auto_bind, AutoBind, ChangeEvent, ChangeObserver, Lane, ObjectId, Observable, SourceType};
//!
//! struct Player;
//! impl Observable for Player {
//!     fn object_id(&self) -> ObjectId { ObjectId::next() }
//!     fn add_observer(&self, _: &str, _: Weak<dyn ChangeObserver>) {}
//!     fn remove_observer(&self, _: &str, _: ObjectId) {}
//! }
//!
//! struct Hud;
//! impl Hud {
//!     fn on_score(&self, _ev: &ChangeEvent) {}
//!     fn on_name(&self, _ev: &ChangeEvent) {}
//! }
//!
//! auto_bind! {
//!     Hud {
//!         Player => [
//!             "score" => on_score on Lane::Main,
//!             "name" => on_name on Lane::Background,
//!         ],
//!     }
//! }
//!
//! let handlers = Hud::declared_bindings(SourceType::of::<Player>());
//! assert_eq!(handlers.len(), 2);
//! assert_eq!(handlers[0].key_path, "score");
//! assert!(Hud::declared_bindings(SourceType::of::<String>()).is_empty());
//! ```

use std::fmt;
use std::marker::PhantomData;

use super::event::ChangeEvent;
use super::record::Delivery;
use super::source::SourceType;
use crate::lanes::Lane;

/// One declared binding: key path → handler method on lane.
pub struct Handler<R> {
    /// Observed key path.
    pub key_path: &'static str,
    /// Handler identifier (the method name).
    pub name: &'static str,
    /// Handler method.
    pub handler: fn(&R, &ChangeEvent),
    /// Lane the handler runs on.
    pub lane: Lane,
    /// How delivery is scheduled onto the lane.
    pub delivery: Delivery,
}

impl<R> Handler<R> {
    /// Declares a handler delivered with [`Delivery::Post`].
    pub const fn new(
        key_path: &'static str,
        name: &'static str,
        handler: fn(&R, &ChangeEvent),
        lane: Lane,
    ) -> Self {
        Self {
            key_path,
            name,
            handler,
            lane,
            delivery: Delivery::Post,
        }
    }

    /// Marks the handler inline-safe: when the change is raised on the
    /// handler's own lane it runs without a queue hop.
    pub const fn inline(mut self) -> Self {
        self.delivery = Delivery::RunOrEnqueue;
        self
    }
}

impl<R> Clone for Handler<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Handler<R> {}

impl<R> fmt::Debug for Handler<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("key_path", &self.key_path)
            .field("name", &self.name)
            .field("lane", &self.lane)
            .field("delivery", &self.delivery)
            .finish()
    }
}

/// Static binding declarations of a receiver type.
pub trait AutoBind: Send + Sync + Sized + 'static {
    /// Handlers this receiver declares for sources of type `source`, in
    /// declaration order. Must be a pure function of its input.
    fn declared_bindings(source: SourceType) -> Vec<Handler<Self>>;
}

/// Injectable resolver.
pub trait Resolve<R>: Send + Sync {
    /// All handlers for `source`, in order.
    fn resolve(&self, source: SourceType) -> Vec<Handler<R>>;

    /// The handler for one key path, if declared.
    fn resolve_key(&self, source: SourceType, key_path: &str) -> Option<Handler<R>> {
        self.resolve(source)
            .into_iter()
            .find(|h| h.key_path == key_path)
    }
}

/// Resolver backed by the receiver's [`AutoBind`] declarations.
pub struct Declared<R>(PhantomData<fn() -> R>);

impl<R> Declared<R> {
    /// Creates the resolver.
    pub fn new() -> Self {
        Declared(PhantomData)
    }
}

impl<R> Default for Declared<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: AutoBind> Resolve<R> for Declared<R> {
    fn resolve(&self, source: SourceType) -> Vec<Handler<R>> {
        R::declared_bindings(source)
    }
}

/// Implements [`AutoBind`] from a declaration table.
///
/// ```text
/// auto_bind! {
///     Receiver {
///         SourceA => [ "key" => handler_method on Lane::Main, ... ],
///         SourceB => [ ... ],
///     }
/// }
/// ```
#[macro_export]
macro_rules! auto_bind {
    (
        $receiver:ty {
            $( $source:ty => [ $( $key:literal => $handler:ident on $lane:expr ),* $(,)? ] ),* $(,)?
        }
    ) => {
        impl $crate::AutoBind for $receiver {
            fn declared_bindings(source: $crate::SourceType) -> ::std::vec::Vec<$crate::Handler<Self>> {
                $(
                    if source.is::<$source>() {
                        return ::std::vec![
                            $( $crate::Handler::new($key, ::std::stringify!($handler), <$receiver>::$handler, $lane) ),*
                        ];
                    }
                )*
                ::std::vec::Vec::new()
            }
        }
    };
}
