//! # Serial execution queue.
//!
//! A [`SerialQueue`] is one FIFO of jobs drained by one dedicated worker task.
//! Jobs on the same queue never overlap; jobs on different queues run
//! concurrently.
//!
//! ## Architecture
//! ```text
//! enqueue(job) ──► [unbounded FIFO] ──► worker task ──► CURRENT_QUEUE.sync_scope(id, job)
//!                                             │
//!                                             ├─► panic → logged, next job (catch_panics)
//!                                             └─► slow  → warn (slow_job threshold)
//! ```
//!
//! ## Rules
//! - **Non-blocking**: `enqueue()` never waits; the FIFO is unbounded.
//! - **Identity**: each queue gets a process-unique [`QueueId`]; clones share it.
//! - **Current queue**: the marker is set only while a job of this queue is
//!   executing, so code is "on" a queue by queue identity, never by thread
//!   identity. Unrelated work sharing the runtime thread cannot observe it.
//! - **Shutdown**: the worker exits once every handle is dropped and the FIFO
//!   is drained.
//!
//! Jobs run synchronously on the runtime worker thread. Long blocking jobs
//! stall that thread, so a multi-threaded runtime is recommended for lanes
//! that block.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{error, trace, warn};

use crate::config::BusConfig;
use crate::error::BusError;

/// Global counter for queue identities.
static QUEUE_SEQ: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT_QUEUE: QueueId;
}

/// Unit of work accepted by a queue.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Stable identity of a serial queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(u64);

impl QueueId {
    fn next() -> Self {
        QueueId(QUEUE_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Identity of the queue whose job is executing right now, if any.
    pub fn current() -> Option<QueueId> {
        CURRENT_QUEUE.try_with(|id| *id).ok()
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q#{}", self.0)
    }
}

struct Inner {
    id: QueueId,
    label: Arc<str>,
    tx: mpsc::UnboundedSender<Job>,
}

/// Handle to a serial queue.
///
/// Cheap to clone; all clones feed the same worker. Equality is identity.
#[derive(Clone)]
pub struct SerialQueue {
    inner: Arc<Inner>,
}

impl SerialQueue {
    /// Creates a queue with the default [`BusConfig`] on the current runtime.
    ///
    /// # Panics
    /// Panics when called outside of a Tokio runtime, like `tokio::spawn`.
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self::spawn_on(label, &BusConfig::default(), &Handle::current())
    }

    /// Creates a queue on the current runtime, failing if there is none.
    pub fn try_new(label: impl Into<Arc<str>>, cfg: &BusConfig) -> Result<Self, BusError> {
        let handle = Handle::try_current().map_err(|_| BusError::NoRuntime)?;
        Ok(Self::spawn_on(label, cfg, &handle))
    }

    /// Creates a queue whose worker runs on the given runtime.
    pub fn spawn_on(label: impl Into<Arc<str>>, cfg: &BusConfig, handle: &Handle) -> Self {
        let id = QueueId::next();
        let label: Arc<str> = label.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let worker_label = Arc::clone(&label);
        let slow = cfg.slow_job_threshold();
        let catch_panics = cfg.catch_panics;

        handle.spawn(async move {
            while let Some(job) = rx.recv().await {
                let started = Instant::now();
                if catch_panics {
                    let res = CURRENT_QUEUE.sync_scope(id, || catch_unwind(AssertUnwindSafe(job)));
                    if let Err(panic_err) = res {
                        let info = panic_message(&*panic_err);
                        error!(queue = %worker_label, %id, panic = %info, "job panicked");
                    }
                } else {
                    CURRENT_QUEUE.sync_scope(id, job);
                }

                if let Some(limit) = slow {
                    let elapsed = started.elapsed();
                    if elapsed > limit {
                        warn!(queue = %worker_label, %id, ?elapsed, ?limit, "slow job");
                    }
                }
            }
            trace!(queue = %worker_label, %id, "queue worker exited");
        });

        Self {
            inner: Arc::new(Inner { id, label, tx }),
        }
    }

    /// Identity of this queue.
    #[inline]
    pub fn id(&self) -> QueueId {
        self.inner.id
    }

    /// Human-readable label.
    #[inline]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Returns `true` when the caller is executing a job of this queue.
    #[inline]
    pub fn is_current(&self) -> bool {
        QueueId::current() == Some(self.inner.id)
    }

    /// Appends a job; returns `false` if the worker is gone and the job was
    /// not accepted.
    pub fn enqueue(&self, job: Job) -> bool {
        self.inner.tx.send(job).is_ok()
    }

    /// Returns `true` when the worker has stopped accepting jobs.
    pub fn is_closed(&self) -> bool {
        self.inner.tx.is_closed()
    }
}

impl PartialEq for SerialQueue {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for SerialQueue {}

impl fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialQueue")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .finish()
    }
}

fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_jobs_run_in_fifo_order() {
        let q = SerialQueue::new("test.fifo");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..100 {
            let seen = Arc::clone(&seen);
            assert!(q.enqueue(Box::new(move || seen.lock().unwrap().push(i))));
        }
        let (tx, rx) = oneshot::channel();
        q.enqueue(Box::new(move || {
            let _ = tx.send(());
        }));
        rx.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_current_marker_only_inside_jobs() {
        let q = SerialQueue::new("test.marker");
        let other = SerialQueue::new("test.other");
        assert!(!q.is_current());
        assert_eq!(QueueId::current(), None);

        let (tx, rx) = oneshot::channel();
        let mine = q.clone();
        q.enqueue(Box::new(move || {
            let _ = tx.send((mine.is_current(), other.is_current()));
        }));
        assert_eq!(rx.await.unwrap(), (true, false));
    }

    #[tokio::test]
    async fn test_panic_does_not_stop_queue() {
        let q = SerialQueue::new("test.panic");
        q.enqueue(Box::new(|| panic!("boom")));
        let (tx, rx) = oneshot::channel();
        q.enqueue(Box::new(move || {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.await.unwrap(), 42);
        assert!(!q.is_closed());
    }

    #[test]
    fn test_try_new_outside_runtime() {
        let err = SerialQueue::try_new("test.none", &BusConfig::default()).unwrap_err();
        assert_eq!(err, BusError::NoRuntime);
    }

    #[tokio::test]
    async fn test_identity_equality() {
        let a = SerialQueue::new("a");
        let b = SerialQueue::new("a");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&7u32), "unknown panic");
    }
}
