//! # lanekvo
//!
//! **lanekvo** binds receivers to observable properties of sources and runs
//! every change notification on a named execution lane.
//!
//! It provides two building blocks:
//! - a **lane bus**: a fixed set of logical lanes, each bound to one serial
//!   queue, with immediate, delayed and run-in-place submission;
//! - an **observer binding registry**: per-receiver bindings of
//!   `(source, key path) → handler on lane`, resolved from static
//!   declarations, torn down automatically with the receiver.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐          ┌──────────────┐
//!     │   Receiver   │          │    Source    │
//!     │   (owns a    │          │ (Observable, │
//!     │    Binder)   │          │ ObserverList)│
//!     └──────┬───────┘          └──────┬───────┘
//!            │ single_bind /           │ RawChange
//!            │ single_bind_to          │ (any thread)
//!            ▼                         ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Dispatcher (one per receiver)                                │
//! │  - BindingRegistry ((source id, key path) → record)           │
//! │  - weak source: upgrade or sweep                              │
//! └──────────────────────────────┬────────────────────────────────┘
//!                                │ ChangeEvent
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  LaneBus                                                      │
//! │  Main │ Other │ Io │ Net │ Db │ Working │ Background │ Log    │
//! │    │      │     │     │    │       │           │        │     │
//! │    ▼      ▼     ▼     ▼    ▼       ▼           ▼        ▼     │
//! │  SerialQueue per lane (one FIFO worker task each)             │
//! │  DelayTimer (one per bus, releases delayed jobs in order)     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Delivery
//! ```text
//! source.notify(RawChange)
//!   └─► Dispatcher::observe_change
//!         ├─ no record / inactive      ─► drop
//!         ├─ source gone               ─► sweep record, drop
//!         └─ ChangeEvent { seq, .. }
//!              ├─ Delivery::Post         ─► LaneBus::post(lane)
//!              └─ Delivery::RunOrEnqueue ─► LaneBus::run_or_enqueue(lane)
//!                                             └─► handler(&receiver, &event)
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                          |
//! |-------------------|----------------------------------------------------------|---------------------------------------------|
//! | **Lanes**         | Named serial execution contexts, delayed submission.     | [`Lane`], [`LaneBus`], [`SerialQueue`]     |
//! | **Sources**       | Boundary with the host's observation mechanism.          | [`Observable`], [`ObserverList`]            |
//! | **Bindings**      | Per-receiver binding management.                         | [`Binder`], [`Dispatcher`]                  |
//! | **Declarations**  | Static handler tables, injectable resolvers.             | [`AutoBind`], [`auto_bind!`], [`Resolve`]   |
//! | **Errors**        | Typed errors for the bus and binding requests.           | [`BusError`], [`BindError`]                 |
//! | **Configuration** | Queue labels, slow-job warnings, panic isolation.        | [`BusConfig`]                               |
//!
//! ## Example
//! ```rust
//! use std::sync::{Arc, Weak};
//! use parking_lot::Mutex;
//! use lanekvo::{
//!     auto_bind, Binder, BusConfig, ChangeEvent, ChangeObserver, Lane, LaneBus, ObjectId,
//!     Observable, ObserverList, RawChange,
//! };
//!
//! struct Player {
//!     list: ObserverList,
//!     score: Mutex<i64>,
//! }
//!
//! impl Player {
//!     fn set_score(&self, v: i64) {
//!         let old = std::mem::replace(&mut *self.score.lock(), v);
//!         self.list.notify(RawChange::new(self.list.id(), "score").with_old(old).with_new(v));
//!     }
//! }
//!
//! impl Observable for Player {
//!     fn object_id(&self) -> ObjectId { self.list.id() }
//!     fn add_observer(&self, key: &str, o: Weak<dyn ChangeObserver>) { self.list.add(key, o) }
//!     fn remove_observer(&self, key: &str, o: ObjectId) { self.list.remove(key, o) }
//! }
//!
//! struct Hud {
//!     binder: Binder<Hud>,
//!     done: Mutex<Option<tokio::sync::oneshot::Sender<i64>>>,
//! }
//!
//! impl Hud {
//!     fn on_score(&self, ev: &ChangeEvent) {
//!         if let (Some(tx), Some(v)) = (self.done.lock().take(), ev.new_as::<i64>()) {
//!             let _ = tx.send(*v);
//!         }
//!     }
//! }
//!
//! auto_bind! {
//!     Hud {
//!         Player => [ "score" => on_score on Lane::Main ],
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = LaneBus::started(BusConfig::default())?;
//!     let (tx, rx) = tokio::sync::oneshot::channel();
//!
//!     let hud = Arc::new_cyclic(|me| Hud {
//!         binder: Binder::with_bus(me, Arc::clone(&bus)),
//!         done: Mutex::new(Some(tx)),
//!     });
//!     let player = Arc::new(Player { list: ObserverList::new(), score: Mutex::new(0) });
//!
//!     hud.binder.single_bind_to(Some(&player));
//!     player.set_score(10);
//!
//!     assert_eq!(rx.await?, 10);
//!     Ok(())
//! }
//! ```
mod config;
mod error;
mod kvo;
mod lanes;

// ---- Public re-exports ----

pub use config::BusConfig;
pub use error::{BindError, BusError};
pub use kvo::{
    Action, AutoBind, Binder, BindingRegistry, ChangeEvent, ChangeObserver, Declared, Delivery,
    Dispatcher, Handler, MethodRef, Mutation, MutationKind, NotifyFn, ObjectId, Observable,
    ObservationRecord, ObserverList, RawChange, RecordKey, Resolve, SourceType, Value,
};
pub use lanes::{Job, Lane, LaneBus, QueueId, SerialQueue};
