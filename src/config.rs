//! # Lane bus configuration.
//!
//! Provides [`BusConfig`], the centralized settings for a [`LaneBus`](crate::LaneBus).
//!
//! ## Sentinel values
//! - `slow_job = 0s` → slow-job warnings disabled

use std::borrow::Cow;
use std::time::Duration;

/// Configuration for a lane bus and the serial queues it creates.
///
/// ## Field semantics
/// - `label_prefix`: prefix for queue labels, a lane's queue is named `"{prefix}.{lane}"`
/// - `slow_job`: jobs running longer than this are logged at warn level (`0s` = off)
/// - `catch_panics`: isolate job panics inside the queue worker
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Prefix used when labelling the queues created by `startup()`.
    pub label_prefix: Cow<'static, str>,

    /// Threshold above which a single job is reported as slow.
    ///
    /// - `Duration::ZERO` = never report
    /// - `> 0` = warn with lane, queue and elapsed time
    pub slow_job: Duration,

    /// Whether a panicking job is caught at the queue boundary.
    ///
    /// With `true` the panic is logged and the queue moves on to its next job.
    /// With `false` the panic unwinds the worker task and the queue stops
    /// accepting work.
    pub catch_panics: bool,
}

impl BusConfig {
    /// Returns the slow-job threshold as an `Option`.
    ///
    /// - `None` → disabled
    /// - `Some(d)` → warn for jobs running longer than `d`
    #[inline]
    pub fn slow_job_threshold(&self) -> Option<Duration> {
        if self.slow_job == Duration::ZERO {
            None
        } else {
            Some(self.slow_job)
        }
    }

    /// Builds the queue label for the given lane name.
    #[inline]
    pub fn queue_label(&self, lane: &str) -> String {
        format!("{}.{lane}", self.label_prefix)
    }
}

impl Default for BusConfig {
    /// Default configuration:
    ///
    /// - `label_prefix = "lane"`
    /// - `slow_job = 0s` (disabled)
    /// - `catch_panics = true`
    fn default() -> Self {
        Self {
            label_prefix: Cow::Borrowed("lane"),
            slow_job: Duration::ZERO,
            catch_panics: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slow_job_sentinel() {
        let mut cfg = BusConfig::default();
        assert_eq!(cfg.slow_job_threshold(), None);
        cfg.slow_job = Duration::from_millis(50);
        assert_eq!(cfg.slow_job_threshold(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_queue_label() {
        let cfg = BusConfig {
            label_prefix: "app".into(),
            ..BusConfig::default()
        };
        assert_eq!(cfg.queue_label("io"), "app.io");
    }
}
