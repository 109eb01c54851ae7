//! Core type definitions shared across the crate.
//!
//! Simulated time, physical address ranges and the identifiers used to name
//! components and ports inside a topology graph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Simulated time in engine ticks.
///
/// The convention follows the usual event-driven engines: one tick is one
/// picosecond, so a 1 GHz clock has a period of 1000 ticks.
pub type Tick = u64;

/// Number of ticks in one simulated second.
pub const TICKS_PER_SECOND: Tick = 1_000_000_000_000;

/// Name of a component, unique within one topology graph.
pub type ComponentName = String;

/// Name of a port declared on a component (e.g. `"cpu_side"`).
pub type PortName = String;

/// A half-open physical address range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddrRange {
    /// First address covered by the range
    pub start: u64,
    /// First address past the end of the range
    pub end: u64,
}

impl AddrRange {
    /// Creates the range `[start, end)`.
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Creates the range `[0, size)`.
    pub fn with_size(size: u64) -> Self {
        Self::new(0, size)
    }

    /// Returns the number of bytes covered.
    pub fn size(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the range covers no address.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Returns true if `addr` falls inside the range.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Returns true if the two ranges share at least one address.
    pub fn overlaps(&self, other: &AddrRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for AddrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr_range_basics() {
        let range = AddrRange::with_size(512 * 1024 * 1024);
        assert_eq!(range.start, 0);
        assert_eq!(range.size(), 512 * 1024 * 1024);
        assert!(range.contains(0));
        assert!(!range.contains(512 * 1024 * 1024));
        assert!(!range.is_empty());
    }

    #[test]
    fn test_addr_range_overlap() {
        let a = AddrRange::new(0, 100);
        let b = AddrRange::new(50, 150);
        let c = AddrRange::new(100, 200);

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(AddrRange::new(10, 10).is_empty());
    }

    #[test]
    fn test_addr_range_display() {
        assert_eq!(AddrRange::new(0, 0x1000).to_string(), "[0x0, 0x1000)");
    }
}
