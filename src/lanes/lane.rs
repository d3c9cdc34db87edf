//! # Lane tags.
//!
//! The set of lanes is fixed at build time. Each lane has a stable integer tag
//! used as its index into the bus table.

use std::fmt;

use crate::error::BusError;

/// Logical execution context with serial semantics relative to itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Lane {
    /// UI / application main lane.
    Main = 0,
    /// Catch-all bucket for work with no better home.
    Other = 1,
    /// File and disk I/O.
    Io = 2,
    /// Network calls.
    Net = 3,
    /// Database access.
    Db = 4,
    /// User-initiated work whose result is awaited right away.
    Working = 5,
    /// Long-running background work (minutes to hours).
    Background = 6,
    /// Log writing.
    Log = 7,
}

impl Lane {
    /// Number of lanes.
    pub const COUNT: usize = 8;

    /// Every lane, in tag order.
    pub const ALL: [Lane; Lane::COUNT] = [
        Lane::Main,
        Lane::Other,
        Lane::Io,
        Lane::Net,
        Lane::Db,
        Lane::Working,
        Lane::Background,
        Lane::Log,
    ];

    /// Stable integer tag.
    #[inline]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// Short lowercase name, used in queue labels and logs.
    pub const fn name(self) -> &'static str {
        match self {
            Lane::Main => "main",
            Lane::Other => "other",
            Lane::Io => "io",
            Lane::Net => "net",
            Lane::Db => "db",
            Lane::Working => "working",
            Lane::Background => "background",
            Lane::Log => "log",
        }
    }
}

impl TryFrom<u8> for Lane {
    type Error = BusError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Lane::ALL
            .get(usize::from(tag))
            .copied()
            .ok_or(BusError::UnknownLane { tag })
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_match_table_order() {
        for (i, lane) in Lane::ALL.iter().enumerate() {
            assert_eq!(lane.index(), i);
            assert_eq!(Lane::try_from(lane.tag()), Ok(*lane));
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert_eq!(
            Lane::try_from(Lane::COUNT as u8),
            Err(BusError::UnknownLane { tag: 8 })
        );
        assert_eq!(Lane::Background.to_string(), "background");
    }
}
