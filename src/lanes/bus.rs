//! # Lane bus: thread-affine dispatch over serial queues.
//!
//! [`LaneBus`] owns a fixed table mapping every [`Lane`] to one [`SerialQueue`]
//! and a delay timer for scheduled work.
//!
//! ## Architecture
//! ```text
//!   post(lane, job) ────────────────────────────┐
//!   run_or_enqueue(lane, job) ─► on lane? ─ yes ─► job() in place
//!                                    └─ no ─────┤
//!   post_after / post_at ─► DelayTimer ─────────┤ (at eligibility)
//!                                               ▼
//!                                  LaneTable[lane].load() ──► SerialQueue ──► worker
//! ```
//!
//! ## Rules
//! - **Non-blocking**: every `post*` returns immediately.
//! - **Per-lane FIFO**: immediate posts run in post order; delayed posts are
//!   appended to the lane in `(eligibility, post order)` order.
//! - **No cross-lane ordering.**
//! - **Atomic rebind**: `set_queue` swaps the lane's slot; posts that load the
//!   slot after the swap go to the new queue, jobs already on the old queue
//!   finish there.
//! - **Fail fast**: posting to a lane with no bound queue (bus not started)
//!   panics, since it means the host skipped `startup()`.
//!
//! ## Same-lane detection
//! `run_or_enqueue` compares the [`QueueId`](super::QueueId) marker of the
//! executing job with the lane's bound queue. The marker exists only while a
//! queue job runs, which keeps the check correct even though queue workers
//! share runtime threads with unrelated tasks. Two lanes bound to the same
//! queue are the same lane for this purpose.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::lane::Lane;
use super::queue::{Job, SerialQueue};
use super::timer::DelayTimer;
use crate::config::BusConfig;
use crate::error::BusError;

/// Process-wide bus returned by [`LaneBus::shared`].
static SHARED: OnceLock<Arc<LaneBus>> = OnceLock::new();

/// Lane → queue slots.
pub(crate) struct LaneTable {
    slots: [ArcSwapOption<SerialQueue>; Lane::COUNT],
}

impl LaneTable {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| ArcSwapOption::empty()),
        }
    }

    #[inline]
    fn slot(&self, lane: Lane) -> &ArcSwapOption<SerialQueue> {
        &self.slots[lane.index()]
    }

    fn get(&self, lane: Lane) -> Option<Arc<SerialQueue>> {
        self.slot(lane).load_full()
    }

    /// Returns the bound queue, failing fast when the lane is unbound.
    fn bound(&self, lane: Lane) -> Arc<SerialQueue> {
        match self.get(lane) {
            Some(q) => q,
            None => panic!("lane `{lane}` has no queue bound; call LaneBus::startup() first"),
        }
    }

    /// Enqueues on the lane's current queue. Used by the timer, which may
    /// outlive a shutdown by one tick, so an unbound lane is logged instead.
    pub(crate) fn enqueue(&self, lane: Lane, job: Job) {
        match self.get(lane) {
            Some(q) => push(&q, lane, job),
            None => warn!(%lane, "scheduled job dropped, lane unbound"),
        }
    }
}

fn push(queue: &SerialQueue, lane: Lane, job: Job) {
    if !queue.enqueue(job) {
        error!(%lane, queue = queue.label(), "job dropped, queue worker is gone");
    }
}

/// Multiplexes the fixed lane set onto serial queues.
pub struct LaneBus {
    cfg: BusConfig,
    table: Arc<LaneTable>,
    timer: ArcSwapOption<DelayTimer>,
    lifecycle: Mutex<()>,
}

impl LaneBus {
    /// Creates an unstarted bus.
    pub fn new(cfg: BusConfig) -> Self {
        Self {
            cfg,
            table: Arc::new(LaneTable::new()),
            timer: ArcSwapOption::empty(),
            lifecycle: Mutex::new(()),
        }
    }

    /// Creates and starts a bus on the current runtime.
    pub fn started(cfg: BusConfig) -> Result<Arc<Self>, BusError> {
        let bus = Arc::new(Self::new(cfg));
        bus.startup()?;
        Ok(bus)
    }

    /// The process-wide bus (default configuration, initialized once).
    ///
    /// It is created unstarted; the host calls [`startup`](Self::startup) once
    /// its runtime is up.
    pub fn shared() -> Arc<LaneBus> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(LaneBus::new(BusConfig::default()))))
    }

    /// Configuration this bus was built with.
    pub fn config(&self) -> &BusConfig {
        &self.cfg
    }

    /// Binds a fresh queue to every unbound lane and starts the delay timer.
    ///
    /// Idempotent: lanes already bound (by a previous call or `set_queue`)
    /// keep their queue.
    pub fn startup(&self) -> Result<(), BusError> {
        let handle = Handle::try_current().map_err(|_| BusError::NoRuntime)?;
        let _guard = self.lifecycle.lock();

        for lane in Lane::ALL {
            let slot = self.table.slot(lane);
            if slot.load().is_none() {
                let label = self.cfg.queue_label(lane.name());
                let queue = SerialQueue::spawn_on(label, &self.cfg, &handle);
                debug!(%lane, queue = queue.label(), id = %queue.id(), "lane bound");
                slot.store(Some(Arc::new(queue)));
            }
        }
        if self.timer.load().is_none() {
            let timer = DelayTimer::spawn(&handle, Arc::clone(&self.table));
            self.timer.store(Some(Arc::new(timer)));
        }
        Ok(())
    }

    /// Returns `true` once every lane has a queue.
    pub fn is_started(&self) -> bool {
        Lane::ALL.iter().all(|&lane| self.table.slot(lane).load().is_some())
    }

    /// Stops the delay timer and unbinds every lane.
    ///
    /// Jobs already enqueued drain on their queues; jobs still waiting for
    /// their eligibility time are dropped.
    pub fn shutdown(&self) {
        let _guard = self.lifecycle.lock();
        if let Some(timer) = self.timer.swap(None) {
            timer.stop();
        }
        for lane in Lane::ALL {
            self.table.slot(lane).store(None);
        }
        debug!("lane bus shut down");
    }

    /// Enqueues `work` on `lane`. Never blocks.
    ///
    /// # Panics
    /// Panics if the lane has no bound queue.
    pub fn post<F>(&self, lane: Lane, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let queue = self.table.bound(lane);
        push(&queue, lane, Box::new(work));
    }

    /// Enqueues `work` on `lane` once `delay` has elapsed.
    ///
    /// A zero delay is a plain [`post`](Self::post).
    ///
    /// # Panics
    /// Panics if the bus has not been started.
    pub fn post_after<F>(&self, lane: Lane, delay: Duration, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if delay.is_zero() {
            self.post(lane, work);
            return;
        }
        self.schedule(lane, Instant::now() + delay, Box::new(work));
    }

    /// Enqueues `work` on `lane` at the absolute instant `at`.
    ///
    /// An instant in the past is treated as eligible immediately.
    ///
    /// # Panics
    /// Panics if the bus has not been started.
    pub fn post_at<F>(&self, lane: Lane, at: Instant, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let now = Instant::now();
        if at <= now {
            debug!(%lane, late_by = ?now.saturating_duration_since(at), "post_at in the past, running now");
            self.post(lane, work);
            return;
        }
        self.schedule(lane, at, Box::new(work));
    }

    fn schedule(&self, lane: Lane, at: Instant, job: Job) {
        // Unbound lane fails here, at the caller.
        let _ = self.table.bound(lane);
        match self.timer.load_full() {
            Some(timer) => {
                if !timer.schedule(lane, at, job) {
                    error!(%lane, "scheduled job dropped, delay timer is gone");
                }
            }
            None => panic!("lane bus has no delay timer; call LaneBus::startup() first"),
        }
    }

    /// Runs `work` in place when the caller is already executing on `lane`'s
    /// queue, otherwise enqueues it like [`post`](Self::post).
    ///
    /// # Panics
    /// Panics if the lane has no bound queue.
    pub fn run_or_enqueue<F>(&self, lane: Lane, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let queue = self.table.bound(lane);
        if queue.is_current() {
            work();
        } else {
            push(&queue, lane, Box::new(work));
        }
    }

    /// Returns `true` when the caller is executing a job of `lane`'s queue.
    pub fn is_current(&self, lane: Lane) -> bool {
        self.table.get(lane).is_some_and(|q| q.is_current())
    }

    /// Rebinds `lane` to `queue`.
    ///
    /// Work already on the previous queue completes there.
    pub fn set_queue(&self, lane: Lane, queue: SerialQueue) {
        let _guard = self.lifecycle.lock();
        debug!(%lane, queue = queue.label(), id = %queue.id(), "lane rebound");
        self.table.slot(lane).store(Some(Arc::new(queue)));
    }

    /// Returns the queue currently bound to `lane`.
    pub fn queue_of(&self, lane: Lane) -> Option<SerialQueue> {
        self.table.get(lane).map(|q| (*q).clone())
    }
}

impl Default for LaneBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}
