//! # Example: scoreboard
//!
//! A HUD receiver bound to a player's `score` and `name` properties.
//!
//! Shows how to:
//! - Embed an [`ObserverList`] in a source to implement [`Observable`].
//! - Declare handlers per key path and lane with [`auto_bind!`].
//! - Bind with [`Binder::single_bind_to`] and tear down with
//!   [`Binder::clear_kvo_connection`].
//! - Schedule delayed work with [`LaneBus::post_after`].
//!
//! ## Flow
//! ```text
//! Player::set_score ──► ObserverList::notify(RawChange)
//!     └─► Dispatcher::observe_change
//!           ├─► "score" ─► LaneBus::post(Main)       ─► Hud::on_score
//!           └─► "name"  ─► LaneBus::post(Background) ─► Hud::on_name
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=lanekvo=debug cargo run --example scoreboard
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use lanekvo::{
    Binder, BusConfig, ChangeEvent, ChangeObserver, Lane, LaneBus, ObjectId, Observable,
    ObserverList, RawChange, auto_bind,
};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

/// Observable game state.
struct Player {
    list: ObserverList,
    score: Mutex<i64>,
    name: Mutex<String>,
}

impl Player {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            list: ObserverList::new(),
            score: Mutex::new(0),
            name: Mutex::new(name.to_string()),
        })
    }

    fn set_score(&self, v: i64) {
        let old = std::mem::replace(&mut *self.score.lock(), v);
        self.list
            .notify(RawChange::new(self.list.id(), "score").with_old(old).with_new(v));
    }

    fn rename(&self, v: &str) {
        let old = std::mem::replace(&mut *self.name.lock(), v.to_string());
        self.list.notify(
            RawChange::new(self.list.id(), "name")
                .with_old(old)
                .with_new(v.to_string()),
        );
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

/// Receiver rendering the player's state.
struct Hud {
    binder: Binder<Hud>,
}

impl Hud {
    fn on_score(&self, ev: &ChangeEvent) {
        println!(
            "[hud:main] score {} -> {} (seq={})",
            ev.old_as::<i64>().copied().unwrap_or_default(),
            ev.new_as::<i64>().copied().unwrap_or_default(),
            ev.seq
        );
    }

    fn on_name(&self, ev: &ChangeEvent) {
        println!(
            "[hud:background] name {:?} -> {:?}",
            ev.old_as::<String>().map(String::as_str).unwrap_or(""),
            ev.new_as::<String>().map(String::as_str).unwrap_or("")
        );
    }
}

auto_bind! {
    Hud {
        Player => [
            "score" => on_score on Lane::Main,
            "name" => on_name on Lane::Background,
        ],
    }
}

/// Resolves once everything already posted to `lane` has run.
async fn drain(bus: &LaneBus, lane: Lane) -> anyhow::Result<()> {
    let (tx, rx) = oneshot::channel();
    bus.post(lane, move || {
        let _ = tx.send(());
    });
    rx.await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bus = LaneBus::started(BusConfig {
        slow_job: Duration::from_millis(50),
        ..BusConfig::default()
    })?;

    let hud = Arc::new_cyclic(|me| Hud {
        binder: Binder::with_bus(me, Arc::clone(&bus)),
    });
    let player = Player::new("ada");

    let bound = hud.binder.try_single_bind_to(Some(&player))?;
    println!("[demo] bound {bound} key paths: {:?}", hud.binder.bound_key_paths());

    player.set_score(10);
    player.rename("grace");
    player.set_score(25);

    let delayed = Arc::clone(&player);
    let (tx, rx) = oneshot::channel();
    bus.post_after(Lane::Working, Duration::from_millis(100), move || {
        delayed.set_score(99);
        let _ = tx.send(());
    });
    rx.await?;

    drain(&bus, Lane::Main).await?;
    drain(&bus, Lane::Background).await?;

    hud.binder.clear_kvo_connection("score");
    player.set_score(0);
    player.rename("linus");
    drain(&bus, Lane::Main).await?;
    drain(&bus, Lane::Background).await?;

    println!("[demo] remaining bindings: {:?}", hud.binder.bound_key_paths());
    drop(hud);
    bus.shutdown();
    Ok(())
}
