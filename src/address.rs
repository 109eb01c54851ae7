//! Physical address space partitioning.
//!
//! Every memory controller claims one range of the system's physical address
//! space. The claims must partition the declared space exactly: no two
//! controllers may overlap, no controller may claim memory outside the declared
//! space, and every declared address must belong to some controller.
//!
//! The check sorts the claimed ranges by start address and sweeps them once,
//! so it runs in O(m log m) for m controllers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::AddrRange;

/// How a set of controller ranges fails to partition the address space.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeViolation {
    /// Two controllers claim overlapping ranges.
    Overlap {
        first: String,
        first_range: AddrRange,
        second: String,
        second_range: AddrRange,
    },
    /// Part of the declared space is claimed by no controller.
    Gap { start: u64, end: u64 },
    /// A controller claims memory outside the declared space.
    OutOfBounds { controller: String, range: AddrRange },
}

impl fmt::Display for RangeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeViolation::Overlap {
                first,
                first_range,
                second,
                second_range,
            } => write!(
                f,
                "`{}` {} overlaps `{}` {}",
                first, first_range, second, second_range
            ),
            RangeViolation::Gap { start, end } => write!(
                f,
                "{} is not served by any memory controller",
                AddrRange::new(*start, *end)
            ),
            RangeViolation::OutOfBounds { controller, range } => write!(
                f,
                "`{}` claims {} outside the declared physical space",
                controller, range
            ),
        }
    }
}

/// Checks that `claims` (controller name, range) partition `declared`.
pub fn check_partition(
    claims: &[(&str, AddrRange)],
    declared: &[AddrRange],
) -> Result<(), RangeViolation> {
    let mut sorted: Vec<(&str, AddrRange)> = claims.to_vec();
    sorted.sort_by_key(|(_, r)| (r.start, r.end));

    for pair in sorted.windows(2) {
        let (first, first_range) = pair[0];
        let (second, second_range) = pair[1];
        if first_range.end > second_range.start {
            return Err(RangeViolation::Overlap {
                first: first.to_string(),
                first_range,
                second: second.to_string(),
                second_range,
            });
        }
    }

    let space = coalesce(declared.iter().copied());

    for (name, range) in &sorted {
        let inside = space
            .iter()
            .any(|s| s.start <= range.start && range.end <= s.end);
        if !inside {
            return Err(RangeViolation::OutOfBounds {
                controller: name.to_string(),
                range: *range,
            });
        }
    }

    // Claims are sorted, disjoint and each sits inside one declared segment,
    // so a single sweep per segment finds the first uncovered address.
    let covered = coalesce(sorted.iter().map(|(_, r)| *r));
    for segment in &space {
        let mut cursor = segment.start;
        for cover in covered
            .iter()
            .filter(|c| c.start >= segment.start && c.end <= segment.end)
        {
            if cover.start > cursor {
                return Err(RangeViolation::Gap {
                    start: cursor,
                    end: cover.start,
                });
            }
            cursor = cursor.max(cover.end);
        }
        if cursor < segment.end {
            return Err(RangeViolation::Gap {
                start: cursor,
                end: segment.end,
            });
        }
    }

    Ok(())
}

/// Sorts ranges and merges the ones that touch or overlap.
pub fn coalesce(ranges: impl IntoIterator<Item = AddrRange>) -> Vec<AddrRange> {
    let mut ranges: Vec<AddrRange> = ranges.into_iter().filter(|r| !r.is_empty()).collect();
    ranges.sort();

    let mut merged: Vec<AddrRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_single_controller_exact_cover() {
        let declared = [AddrRange::with_size(512 * MB)];
        let claims = [("mem_ctrl", AddrRange::with_size(512 * MB))];
        assert_eq!(check_partition(&claims, &declared), Ok(()));
    }

    #[test]
    fn test_two_controllers_split_space() {
        let declared = [AddrRange::with_size(512 * MB)];
        let claims = [
            ("mc1", AddrRange::new(256 * MB, 512 * MB)),
            ("mc0", AddrRange::new(0, 256 * MB)),
        ];
        assert_eq!(check_partition(&claims, &declared), Ok(()));
    }

    #[test]
    fn test_overlap_detected() {
        let declared = [AddrRange::with_size(512 * MB)];
        let claims = [
            ("mc0", AddrRange::new(0, 300 * MB)),
            ("mc1", AddrRange::new(256 * MB, 512 * MB)),
        ];
        match check_partition(&claims, &declared) {
            Err(RangeViolation::Overlap { first, second, .. }) => {
                assert_eq!(first, "mc0");
                assert_eq!(second, "mc1");
            }
            other => panic!("expected overlap, got {:?}", other),
        }
    }

    #[test]
    fn test_gap_detected() {
        let declared = [AddrRange::with_size(512 * MB)];
        let claims = [("mem_ctrl", AddrRange::with_size(256 * MB))];
        assert_eq!(
            check_partition(&claims, &declared),
            Err(RangeViolation::Gap {
                start: 256 * MB,
                end: 512 * MB
            })
        );
    }

    #[test]
    fn test_interior_gap_detected() {
        let declared = [AddrRange::with_size(512 * MB)];
        let claims = [
            ("mc0", AddrRange::new(0, 128 * MB)),
            ("mc1", AddrRange::new(256 * MB, 512 * MB)),
        ];
        assert_eq!(
            check_partition(&claims, &declared),
            Err(RangeViolation::Gap {
                start: 128 * MB,
                end: 256 * MB
            })
        );
    }

    #[test]
    fn test_out_of_bounds_detected() {
        let declared = [AddrRange::with_size(512 * MB)];
        let claims = [("mem_ctrl", AddrRange::with_size(1024 * MB))];
        assert!(matches!(
            check_partition(&claims, &declared),
            Err(RangeViolation::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_no_controllers_is_a_gap() {
        let declared = [AddrRange::with_size(MB)];
        assert_eq!(
            check_partition(&[], &declared),
            Err(RangeViolation::Gap { start: 0, end: MB })
        );
    }

    #[test]
    fn test_split_declared_space() {
        let declared = [AddrRange::new(0, MB), AddrRange::new(4 * MB, 5 * MB)];
        let claims = [
            ("lo", AddrRange::new(0, MB)),
            ("hi", AddrRange::new(4 * MB, 5 * MB)),
        ];
        assert_eq!(check_partition(&claims, &declared), Ok(()));
    }

    #[test]
    fn test_coalesce() {
        let merged = coalesce([
            AddrRange::new(10, 20),
            AddrRange::new(0, 10),
            AddrRange::new(30, 40),
            AddrRange::new(35, 50),
        ]);
        assert_eq!(merged, vec![AddrRange::new(0, 20), AddrRange::new(30, 50)]);
    }
}
