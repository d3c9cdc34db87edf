//! # Delay timer for scheduled lane work.
//!
//! One timer task per bus keeps every delayed job in a min-heap ordered by
//! `(eligible_at, seq)`. When a job becomes eligible it is handed to the
//! queue currently bound to its lane, so a rebind between posting and
//! eligibility is honoured.
//!
//! ```text
//! post_after / post_at ──► schedule() ──► [mpsc] ──► timer task
//!                                                     ├─ heap.push
//!                                                     └─ sleep_until(earliest)
//!                                                          └─► table.enqueue(lane, job)
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::bus::LaneTable;
use super::lane::Lane;
use super::queue::Job;

/// A job waiting for its eligibility instant.
struct Scheduled {
    at: Instant,
    seq: u64,
    lane: Lane,
    job: Job,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    /// Reversed so that `BinaryHeap` pops the earliest instant first, and the
    /// earliest post among equal instants.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Handle to the running timer task.
pub(crate) struct DelayTimer {
    tx: mpsc::UnboundedSender<Scheduled>,
    seq: AtomicU64,
    token: CancellationToken,
}

impl DelayTimer {
    /// Spawns the timer task on `handle`, dispatching into `table`.
    pub(crate) fn spawn(handle: &Handle, table: Arc<LaneTable>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Scheduled>();
        let token = CancellationToken::new();
        let rt = token.clone();

        handle.spawn(async move {
            let mut heap: BinaryHeap<Scheduled> = BinaryHeap::new();
            loop {
                let next = heap.peek().map(|s| s.at);
                tokio::select! {
                    _ = rt.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Some(item) => heap.push(item),
                        None => break,
                    },
                    _ = sleep_until_opt(next) => {
                        let now = Instant::now();
                        while heap.peek().is_some_and(|s| s.at <= now) {
                            if let Some(item) = heap.pop() {
                                table.enqueue(item.lane, item.job);
                            }
                        }
                    }
                }
            }
            if !heap.is_empty() {
                debug!(pending = heap.len(), "delay timer stopped, dropping scheduled jobs");
            }
            trace!("delay timer exited");
        });

        Self {
            tx,
            seq: AtomicU64::new(0),
            token,
        }
    }

    /// Schedules `job` for `lane` at `at`; returns `false` if the timer is gone.
    pub(crate) fn schedule(&self, lane: Lane, at: Instant, job: Job) -> bool {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.tx.send(Scheduled { at, seq, lane, job }).is_ok()
    }

    /// Stops the timer task; jobs not yet eligible are dropped.
    pub(crate) fn stop(&self) {
        self.token.cancel();
    }
}

impl Drop for DelayTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
