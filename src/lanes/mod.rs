//! Execution lanes: tags, serial queues, delay timer and the bus tying them together.
//!
//! ## Contents
//! - [`Lane`] the fixed set of logical execution contexts
//! - [`SerialQueue`], [`QueueId`] one FIFO worker and its identity
//! - [`LaneBus`] lane → queue table with post / delayed / run-or-enqueue
//!
//! The delay timer is internal; it is reached through `LaneBus::post_after`
//! and `LaneBus::post_at`.

mod bus;
mod lane;
mod queue;
mod timer;

pub use bus::LaneBus;
pub use lane::Lane;
pub use queue::{Job, QueueId, SerialQueue};
