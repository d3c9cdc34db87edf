//! # Receiver-side binding API.
//!
//! A [`Binder`] is the handle a receiver owns to manage its property
//! bindings. It resolves handlers through a [`Resolve`] implementation,
//! builds records and hands them to the receiver's [`Dispatcher`].
//!
//! ## Rules
//! - One record per `(source, key path)`: binding the same key path on the
//!   same source again replaces the previous binding, and an identical
//!   binding is a no-op. The same key path may be bound on several sources.
//! - Passing `None` as the source unbinds that key path from every source.
//! - Bindings whose source has been dropped are not counted.
//! - The binder holds its receiver weakly. Build the receiver with
//!   [`Arc::new_cyclic`] so the binder can be created inside it.
//! - Dropping the binder clears every binding.
//!
//! ## Example
//! ```rust
//! use std::sync::{Arc, Weak};
//! use lanekvo::{auto_bind, Binder, ChangeEvent, ChangeObserver, Lane, LaneBus, ObjectId, Observable, ObserverList};
//!
//! struct Player {
//!     list: ObserverList,
//! }
//! impl Observable for Player {
//!     fn object_id(&self) -> ObjectId { self.list.id() }
//!     fn add_observer(&self, key: &str, o: Weak<dyn ChangeObserver>) { self.list.add(key, o) }
//!     fn remove_observer(&self, key: &str, o: ObjectId) { self.list.remove(key, o) }
//! }
//!
//! struct Hud {
//!     binder: Binder<Hud>,
//! }
//! impl Hud {
//!     fn on_score(&self, _ev: &ChangeEvent) {}
//! }
//! auto_bind! { Hud { Player => [ "score" => on_score on Lane::Main ] } }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = LaneBus::started(Default::default()).unwrap();
//! let hud = Arc::new_cyclic(|me| Hud { binder: Binder::with_bus(me, bus) });
//! let player = Arc::new(Player { list: ObserverList::new() });
//!
//! assert!(hud.binder.single_bind("score", Some(&player)));
//! assert_eq!(hud.binder.bound_key_paths(), vec!["score"]);
//! assert!(!hud.binder.single_bind::<Player>("score", None));
//! assert!(hud.binder.is_empty());
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::debug;

use super::action::{Action, MethodRef};
use super::dispatcher::Dispatcher;
use super::event::ChangeEvent;
use super::record::{Delivery, ObservationRecord};
use super::resolver::{AutoBind, Declared, Handler, Resolve};
use super::source::{ObjectId, Observable, SourceType};
use crate::error::BindError;
use crate::lanes::{Lane, LaneBus};

/// Owns one receiver's bindings.
pub struct Binder<R: Send + Sync + 'static> {
    receiver: Weak<R>,
    resolver: Arc<dyn Resolve<R>>,
    dispatcher: Arc<Dispatcher>,
}

impl<R: AutoBind> Binder<R> {
    /// Binder using the receiver's declarations and [`LaneBus::shared`].
    pub fn new(receiver: &Weak<R>) -> Self {
        Self::with_bus(receiver, LaneBus::shared())
    }

    /// Binder using the receiver's declarations and the given bus.
    pub fn with_bus(receiver: &Weak<R>, bus: Arc<LaneBus>) -> Self {
        Self::with_resolver(receiver, bus, Arc::new(Declared::<R>::new()))
    }
}

impl<R: Send + Sync + 'static> Binder<R> {
    /// Binder with an injected resolver.
    pub fn with_resolver(receiver: &Weak<R>, bus: Arc<LaneBus>, resolver: Arc<dyn Resolve<R>>) -> Self {
        Self {
            receiver: receiver.clone(),
            resolver,
            dispatcher: Dispatcher::new(ObjectId::next(), bus),
        }
    }

    /// Identity of the receiver as seen by sources.
    pub fn receiver_id(&self) -> ObjectId {
        self.dispatcher.receiver()
    }

    /// The dispatcher routing this receiver's changes.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Binds `key_path` on `source` to the handler declared for it.
    ///
    /// Returns `false` when nothing was bound: empty key path, no declared
    /// handler, or `None` source. A `None` source unbinds `key_path` from
    /// every source it is bound on.
    pub fn single_bind<S: Observable>(&self, key_path: &str, source: Option<&Arc<S>>) -> bool {
        self.try_single_bind(key_path, source).is_ok()
    }

    /// Like [`single_bind`](Self::single_bind), reporting why nothing was bound.
    pub fn try_single_bind<S: Observable>(
        &self,
        key_path: &str,
        source: Option<&Arc<S>>,
    ) -> Result<(), BindError> {
        if key_path.is_empty() {
            return Err(BindError::EmptyKeyPath);
        }
        let Some(source) = source else {
            self.dispatcher.remove_key(key_path);
            return Err(BindError::NoSource);
        };
        let ty = SourceType::of::<S>();
        let handler = self
            .resolver
            .resolve_key(ty, key_path)
            .ok_or_else(|| BindError::NoHandler {
                key_path: key_path.to_string(),
                source_type: ty.name().into(),
            })?;
        self.install(source, handler);
        Ok(())
    }

    /// Binds every handler declared for the source's type.
    ///
    /// Returns `true` if at least one key path is bound. `None` unbinds every
    /// key path declared for `S`.
    pub fn single_bind_to<S: Observable>(&self, source: Option<&Arc<S>>) -> bool {
        self.try_single_bind_to(source).is_ok()
    }

    /// Like [`single_bind_to`](Self::single_bind_to); on success returns the
    /// number of key paths now bound to `source`.
    pub fn try_single_bind_to<S: Observable>(&self, source: Option<&Arc<S>>) -> Result<usize, BindError> {
        let ty = SourceType::of::<S>();
        let handlers = self.resolver.resolve(ty);

        let Some(source) = source else {
            for h in &handlers {
                self.dispatcher.remove_key(h.key_path);
            }
            return Err(BindError::NoSource);
        };
        if handlers.is_empty() {
            return Err(BindError::NothingDeclared {
                source_type: ty.name().into(),
            });
        }

        let mut bound = 0;
        for h in handlers {
            if h.key_path.is_empty() {
                continue;
            }
            self.install(source, h);
            bound += 1;
        }
        if bound == 0 {
            return Err(BindError::EmptyKeyPath);
        }
        Ok(bound)
    }

    /// Binds `key_path` on `source` to an inline callback run on `lane`.
    ///
    /// Returns `false` for an empty key path. Closures never compare equal,
    /// so binding the same key path on the same source again replaces the
    /// previous callback and returns `true`.
    pub fn bind_fn<S, F>(&self, key_path: &str, source: &Arc<S>, lane: Lane, f: F) -> bool
    where
        S: Observable,
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        if key_path.is_empty() {
            return false;
        }
        let source: Arc<dyn Observable> = source.clone();
        let record = ObservationRecord::new(
            self.receiver_id(),
            &source,
            key_path,
            Action::closure(f),
            lane,
            Delivery::Post,
        );
        self.dispatcher.add_binding(&source, record)
    }

    /// Removes the bindings for `key_path` on every source. Returns `false`
    /// if there were none.
    pub fn clear_kvo_connection(&self, key_path: &str) -> bool {
        self.dispatcher.remove_key(key_path)
    }

    /// Removes every binding of this receiver.
    pub fn clear_all_kvo_connections(&self) {
        self.dispatcher.clear_all();
    }

    /// Bound key paths, sorted and without duplicates.
    pub fn bound_key_paths(&self) -> Vec<String> {
        self.dispatcher.key_paths()
    }

    /// Number of live bindings across all sources.
    pub fn len(&self) -> usize {
        self.dispatcher.len()
    }

    /// `true` when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.dispatcher.is_empty()
    }

    fn install<S: Observable>(&self, source: &Arc<S>, h: Handler<R>) {
        let source: Arc<dyn Observable> = source.clone();
        let action = Action::Method(MethodRef::new(self.receiver.clone(), h.name, h.handler));
        let record = ObservationRecord::new(self.receiver_id(), &source, h.key_path, action, h.lane, h.delivery);
        self.dispatcher.add_binding(&source, record);
    }
}

impl<R: Send + Sync + 'static> Drop for Binder<R> {
    fn drop(&mut self) {
        let removed = self.dispatcher.clear_all();
        if removed > 0 {
            debug!(receiver = %self.receiver_id(), removed, "binder dropped");
        }
    }
}

impl<R: Send + Sync + 'static> fmt::Debug for Binder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("receiver", &self.receiver_id())
            .field("bindings", &self.dispatcher.key_paths())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::kvo::event::RawChange;
    use crate::kvo::source::{ChangeObserver, ObserverList};
    use parking_lot::Mutex;
    use tokio::sync::oneshot;

    struct Player {
        list: ObserverList,
        score: Mutex<i64>,
        name: Mutex<String>,
    }

    impl Player {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                list: ObserverList::new(),
                score: Mutex::new(0),
                name: Mutex::new(String::new()),
            })
        }

        fn set_score(&self, v: i64) {
            let old = std::mem::replace(&mut *self.score.lock(), v);
            self.list
                .notify(RawChange::new(self.list.id(), "score").with_old(old).with_new(v));
        }

        fn set_name(&self, v: &str) {
            let old = std::mem::replace(&mut *self.name.lock(), v.to_string());
            self.list
                .notify(RawChange::new(self.list.id(), "name").with_old(old).with_new(v.to_string()));
        }
    }

    impl Observable for Player {
        fn object_id(&self) -> ObjectId {
            self.list.id()
        }
        fn add_observer(&self, key_path: &str, observer: Weak<dyn ChangeObserver>) {
            self.list.add(key_path, observer);
        }
        fn remove_observer(&self, key_path: &str, observer: ObjectId) {
            self.list.remove(key_path, observer);
        }
    }

    struct Scoreboard;
    impl Observable for Scoreboard {
        fn object_id(&self) -> ObjectId {
            ObjectId::next()
        }
        fn add_observer(&self, _: &str, _: Weak<dyn ChangeObserver>) {}
        fn remove_observer(&self, _: &str, _: ObjectId) {}
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Score { old: i64, new: i64, on_main: bool },
        Name { new: String, on_background: bool },
    }

    struct Hud {
        binder: Binder<Hud>,
        bus: Arc<LaneBus>,
        seen: Mutex<Vec<Seen>>,
    }

    impl Hud {
        fn new(bus: &Arc<LaneBus>) -> Arc<Self> {
            Arc::new_cyclic(|me| Hud {
                binder: Binder::with_bus(me, Arc::clone(bus)),
                bus: Arc::clone(bus),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn on_score(&self, ev: &ChangeEvent) {
            self.seen.lock().push(Seen::Score {
                old: ev.old_as::<i64>().copied().unwrap_or_default(),
                new: ev.new_as::<i64>().copied().unwrap_or_default(),
                on_main: self.bus.is_current(Lane::Main),
            });
        }

        fn on_name(&self, ev: &ChangeEvent) {
            self.seen.lock().push(Seen::Name {
                new: ev.new_as::<String>().cloned().unwrap_or_default(),
                on_background: self.bus.is_current(Lane::Background),
            });
        }

        fn take(&self) -> Vec<Seen> {
            std::mem::take(&mut *self.seen.lock())
        }
    }

    crate::auto_bind! {
        Hud {
            Player => [
                "score" => on_score on Lane::Main,
                "name" => on_name on Lane::Background,
            ],
        }
    }

    fn bus() -> Arc<LaneBus> {
        LaneBus::started(BusConfig::default()).unwrap()
    }

    async fn flush(bus: &LaneBus) {
        for lane in Lane::ALL {
            let (tx, rx) = oneshot::channel();
            bus.post(lane, move || {
                let _ = tx.send(());
            });
            rx.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_single_bind_delivers_old_and_new() {
        let bus = bus();
        let hud = Hud::new(&bus);
        let player = Player::new();

        assert!(hud.binder.single_bind("score", Some(&player)));
        player.set_score(10);
        flush(&bus).await;

        assert_eq!(hud.take(), vec![Seen::Score { old: 0, new: 10, on_main: true }]);
    }

    #[tokio::test]
    async fn test_single_bind_twice_keeps_one_record() {
        let bus = bus();
        let hud = Hud::new(&bus);
        let player = Player::new();

        assert!(hud.binder.single_bind("score", Some(&player)));
        assert!(hud.binder.single_bind("score", Some(&player)));
        assert_eq!(hud.binder.len(), 1);
        assert_eq!(player.list.observer_count("score"), 1);

        player.set_score(1);
        flush(&bus).await;
        assert_eq!(hud.take().len(), 1);
    }

    #[tokio::test]
    async fn test_single_bind_to_routes_each_key_to_its_lane() {
        let bus = bus();
        let hud = Hud::new(&bus);
        let player = Player::new();

        assert!(hud.binder.single_bind_to(Some(&player)));
        assert_eq!(hud.binder.bound_key_paths(), vec!["name", "score"]);

        player.set_score(10);
        flush(&bus).await;
        assert_eq!(hud.take(), vec![Seen::Score { old: 0, new: 10, on_main: true }]);

        player.set_name("ada");
        flush(&bus).await;
        assert_eq!(
            hud.take(),
            vec![Seen::Name { new: "ada".into(), on_background: true }]
        );

        assert_eq!(hud.binder.try_single_bind_to(Some(&player)), Ok(2));
        assert_eq!(hud.binder.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_one_key_keeps_others() {
        let bus = bus();
        let hud = Hud::new(&bus);
        let player = Player::new();
        hud.binder.single_bind_to(Some(&player));

        assert!(hud.binder.clear_kvo_connection("score"));
        assert!(!hud.binder.clear_kvo_connection("score"));

        player.set_score(5);
        player.set_name("bob");
        flush(&bus).await;
        assert_eq!(
            hud.take(),
            vec![Seen::Name { new: "bob".into(), on_background: true }]
        );
    }

    #[tokio::test]
    async fn test_clear_all_and_drop_deregister() {
        let bus = bus();
        let hud = Hud::new(&bus);
        let player = Player::new();
        hud.binder.single_bind_to(Some(&player));
        assert_eq!(player.list.observer_count("score"), 1);

        hud.binder.clear_all_kvo_connections();
        assert_eq!(player.list.observer_count("score"), 0);
        assert_eq!(player.list.observer_count("name"), 0);
        player.set_score(3);
        flush(&bus).await;
        assert!(hud.take().is_empty());

        hud.binder.single_bind_to(Some(&player));
        drop(hud);
        assert_eq!(player.list.observer_count("score"), 0);
        assert_eq!(player.list.observer_count("name"), 0);
    }

    #[tokio::test]
    async fn test_refused_binds() {
        let bus = bus();
        let hud = Hud::new(&bus);
        let player = Player::new();
        let board = Arc::new(Scoreboard);

        assert_eq!(hud.binder.try_single_bind("", Some(&player)), Err(BindError::EmptyKeyPath));
        assert!(matches!(
            hud.binder.try_single_bind("level", Some(&player)),
            Err(BindError::NoHandler { .. })
        ));
        assert!(matches!(
            hud.binder.try_single_bind_to(Some(&board)),
            Err(BindError::NothingDeclared { .. })
        ));
        assert!(!hud.binder.single_bind("score", Some(&board)));
        assert!(hud.binder.is_empty());
    }

    #[tokio::test]
    async fn test_none_source_unbinds() {
        let bus = bus();
        let hud = Hud::new(&bus);
        let player = Player::new();
        hud.binder.single_bind_to(Some(&player));

        assert_eq!(hud.binder.try_single_bind::<Player>("score", None), Err(BindError::NoSource));
        assert_eq!(hud.binder.bound_key_paths(), vec!["name"]);
        assert!(!hud.binder.single_bind_to::<Player>(None));
        assert!(hud.binder.is_empty());
    }

    #[tokio::test]
    async fn test_bind_fn_runs_closure_on_lane() {
        let bus = bus();
        let hud = Hud::new(&bus);
        let player = Player::new();
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let lanes = Arc::clone(&bus);

        assert!(hud.binder.bind_fn("score", &player, Lane::Io, move |ev| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send((ev.new_as::<i64>().copied(), lanes.is_current(Lane::Io)));
            }
        }));
        assert!(!hud.binder.bind_fn("", &player, Lane::Io, |_| {}));

        player.set_score(42);
        assert_eq!(rx.await.unwrap(), (Some(42), true));
    }

    #[tokio::test]
    async fn test_same_key_path_on_two_sources_delivers_both() {
        let bus = bus();
        let hud = Hud::new(&bus);
        let a = Player::new();
        let b = Player::new();

        assert!(hud.binder.single_bind("score", Some(&a)));
        assert!(hud.binder.single_bind("score", Some(&b)));
        assert_eq!(hud.binder.len(), 2);
        assert_eq!(hud.binder.bound_key_paths(), vec!["score"]);

        a.set_score(1);
        b.set_score(2);
        flush(&bus).await;
        assert_eq!(
            hud.take(),
            vec![
                Seen::Score { old: 0, new: 1, on_main: true },
                Seen::Score { old: 0, new: 2, on_main: true },
            ]
        );
    }

    #[tokio::test]
    async fn test_rebinding_is_idempotent_per_source() {
        let bus = bus();
        let hud = Hud::new(&bus);
        let a = Player::new();
        let b = Player::new();

        for _ in 0..3 {
            assert!(hud.binder.single_bind("score", Some(&a)));
            assert!(hud.binder.single_bind("score", Some(&b)));
        }
        assert_eq!(hud.binder.len(), 2);
        assert_eq!(a.list.observer_count("score"), 1);
        assert_eq!(b.list.observer_count("score"), 1);

        a.set_score(7);
        flush(&bus).await;
        assert_eq!(hud.take(), vec![Seen::Score { old: 0, new: 7, on_main: true }]);
    }

    #[tokio::test]
    async fn test_clear_key_path_across_sources() {
        let bus = bus();
        let hud = Hud::new(&bus);
        let a = Player::new();
        let b = Player::new();
        hud.binder.single_bind_to(Some(&a));
        hud.binder.single_bind_to(Some(&b));
        assert_eq!(hud.binder.len(), 4);

        assert!(hud.binder.clear_kvo_connection("score"));
        assert_eq!(a.list.observer_count("score"), 0);
        assert_eq!(b.list.observer_count("score"), 0);
        assert_eq!(a.list.observer_count("name"), 1);
        assert_eq!(b.list.observer_count("name"), 1);
        assert_eq!(hud.binder.bound_key_paths(), vec!["name"]);

        a.set_score(1);
        b.set_score(2);
        b.set_name("cy");
        flush(&bus).await;
        assert_eq!(
            hud.take(),
            vec![Seen::Name { new: "cy".into(), on_background: true }]
        );

        hud.binder.clear_all_kvo_connections();
        assert!(hud.binder.is_empty());
        assert_eq!(a.list.observer_count("name"), 0);
        assert_eq!(b.list.observer_count("name"), 0);
    }

    #[tokio::test]
    async fn test_none_source_unbinds_key_on_every_source() {
        let bus = bus();
        let hud = Hud::new(&bus);
        let a = Player::new();
        let b = Player::new();
        hud.binder.single_bind("score", Some(&a));
        hud.binder.single_bind("score", Some(&b));

        assert!(!hud.binder.single_bind::<Player>("score", None));
        assert!(hud.binder.is_empty());
        assert_eq!(a.list.observer_count("score"), 0);
        assert_eq!(b.list.observer_count("score"), 0);
    }

    #[tokio::test]
    async fn test_dropped_source_is_not_counted() {
        let bus = bus();
        let hud = Hud::new(&bus);
        let a = Player::new();
        let b = Player::new();
        hud.binder.single_bind("score", Some(&a));
        hud.binder.single_bind("name", Some(&b));

        drop(a);
        assert_eq!(hud.binder.len(), 1);
        assert_eq!(hud.binder.bound_key_paths(), vec!["name"]);

        drop(b);
        assert_eq!(hud.binder.len(), 0);
        assert!(hud.binder.bound_key_paths().is_empty());
    }

    #[tokio::test]
    async fn test_bind_fn_reports_replacement() {
        let bus = bus();
        let hud = Hud::new(&bus);
        let player = Player::new();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let h = Arc::clone(&hits);
        assert!(hud.binder.bind_fn("score", &player, Lane::Db, move |_| h.lock().push("first")));
        let h = Arc::clone(&hits);
        assert!(hud.binder.bind_fn("score", &player, Lane::Db, move |_| h.lock().push("second")));
        assert_eq!(hud.binder.len(), 1);
        assert_eq!(player.list.observer_count("score"), 1);

        player.set_score(1);
        flush(&bus).await;
        assert_eq!(*hits.lock(), vec!["second"]);
    }

    struct InlineTable;

    impl Resolve<Tracker> for InlineTable {
        fn resolve(&self, source: SourceType) -> Vec<Handler<Tracker>> {
            if source.is::<Player>() {
                vec![Handler::new("score", "on_score", Tracker::on_score, Lane::Io).inline()]
            } else {
                Vec::new()
            }
        }
    }

    struct Tracker {
        binder: Binder<Tracker>,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Tracker {
        fn on_score(&self, _: &ChangeEvent) {
            self.log.lock().push("handler");
        }
    }

    #[tokio::test]
    async fn test_inline_handler_runs_without_hop_on_own_lane() {
        let bus = bus();
        let log = Arc::new(Mutex::new(Vec::new()));
        let tracker = Arc::new_cyclic(|me| Tracker {
            binder: Binder::with_resolver(me, Arc::clone(&bus), Arc::new(InlineTable)),
            log: Arc::clone(&log),
        });
        let player = Player::new();
        assert!(tracker.binder.single_bind("score", Some(&player)));

        let (tx, rx) = oneshot::channel();
        let p = Arc::clone(&player);
        let l = Arc::clone(&log);
        bus.post(Lane::Io, move || {
            p.set_score(1);
            l.lock().push("after");
            let _ = tx.send(());
        });
        rx.await.unwrap();
        assert_eq!(*log.lock(), vec!["handler", "after"]);
    }
}
