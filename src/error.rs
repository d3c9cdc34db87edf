//! Error types used by the lane bus and the binding registry.
//!
//! This module defines two main error enums:
//!
//! - [`BusError`]: errors raised while starting up or addressing the lane bus.
//! - [`BindError`]: reasons a requested binding could not be created.
//!
//! Both types provide `as_label` for logs/metrics. Binding failures are
//! recoverable: the `bool` returning bind operations absorb them, the `try_*`
//! variants surface them.

use std::borrow::Cow;

use thiserror::Error;

/// # Errors produced by the lane bus.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// `startup()` was called outside of a Tokio runtime, so no queue worker
    /// could be spawned.
    #[error("lane bus startup requires a running tokio runtime")]
    NoRuntime,

    /// An integer tag that does not name any [`Lane`](crate::Lane).
    #[error("unknown lane tag {tag}")]
    UnknownLane {
        /// The rejected raw tag.
        tag: u8,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use lanekvo::BusError;
    ///
    /// let err = BusError::UnknownLane { tag: 42 };
    /// assert_eq!(err.as_label(), "bus_unknown_lane");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::NoRuntime => "bus_no_runtime",
            BusError::UnknownLane { .. } => "bus_unknown_lane",
        }
    }
}

/// # Reasons a binding request was refused.
///
/// None of these are fatal; callers decide whether to retry or ignore.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// Key paths must be non-empty.
    #[error("key path is empty")]
    EmptyKeyPath,

    /// The source was absent; any previous binding for the request was dropped.
    #[error("no source given")]
    NoSource,

    /// The receiver declares no handler for this key path on this source type.
    #[error("no handler for key path {key_path:?} on {source_type}")]
    NoHandler {
        /// Requested key path.
        key_path: String,
        /// Type name of the source.
        source_type: Cow<'static, str>,
    },

    /// The receiver declares no handlers at all for this source type.
    #[error("nothing declared for {source_type}")]
    NothingDeclared {
        /// Type name of the source.
        source_type: Cow<'static, str>,
    },
}

impl BindError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BindError::EmptyKeyPath => "bind_empty_key_path",
            BindError::NoSource => "bind_no_source",
            BindError::NoHandler { .. } => "bind_no_handler",
            BindError::NothingDeclared { .. } => "bind_nothing_declared",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(BusError::NoRuntime.as_label(), "bus_no_runtime");
        assert_eq!(BindError::EmptyKeyPath.as_label(), "bind_empty_key_path");
        let err = BindError::NoHandler {
            key_path: "score".into(),
            source_type: "Player".into(),
        };
        assert_eq!(err.as_label(), "bind_no_handler");
        assert_eq!(err.to_string(), "no handler for key path \"score\" on Player");
    }
}
