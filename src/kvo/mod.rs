//! Observer bindings: sources, change payloads, records, dispatch and the
//! receiver-facing binder.
//!
//! ## Contents
//! - [`Observable`], [`ChangeObserver`], [`ObserverList`] the boundary with the host object model
//! - [`RawChange`], [`ChangeEvent`] change payloads
//! - [`Action`], [`ObservationRecord`], [`BindingRegistry`] what is bound and how
//! - [`AutoBind`], [`Resolve`] handler discovery
//! - [`Dispatcher`] routes raw changes onto lanes
//! - [`Binder`] the per-receiver API

mod action;
mod binder;
mod dispatcher;
mod event;
mod record;
mod registry;
mod resolver;
mod source;

pub use action::{Action, MethodRef, NotifyFn};
pub use binder::Binder;
pub use dispatcher::Dispatcher;
pub use event::{ChangeEvent, Mutation, MutationKind, RawChange, Value};
pub use record::{Delivery, ObservationRecord, RecordKey};
pub use registry::BindingRegistry;
pub use resolver::{AutoBind, Declared, Handler, Resolve};
pub use source::{ChangeObserver, ObjectId, Observable, ObserverList, SourceType};
