//! Inclusive byte ranges and the merger that coalesces them into fetch plans
use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid byte range: start ({start}) is after end ({end})")]
pub struct InvalidRangeError {
    start: u64,
    end: u64,
}

/// An inclusive range of bytes within an object, i.e., `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// Create a new [`ByteRange`], failing if `start > end`
    pub fn try_new(start: u64, end: u64) -> Result<Self, InvalidRangeError> {
        if start > end {
            return Err(InvalidRangeError { start, end });
        }
        Ok(Self { start, end })
    }

    /// Create a [`ByteRange`] of `len` bytes beginning at `start`
    ///
    /// Returns `None` for a zero length range, which can not be represented inclusively.
    pub fn with_len(start: u64, len: u64) -> Option<Self> {
        let end = start.checked_add(len.checked_sub(1)?)?;
        Some(Self { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered by this range
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// An inclusive range always covers at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The range from `start` to the last addressable byte
    pub fn starting_at(start: u64) -> Self {
        Self {
            start,
            end: u64::MAX,
        }
    }

    /// Check if `other` lies entirely within this range
    pub fn covers(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Two ranges are mergeable if, ordered by start, the second begins no later than the byte
    /// after the first ends, i.e., they overlap or touch.
    fn mergeable_with(&self, next: &Self) -> bool {
        next.start <= self.end.saturating_add(1)
    }

    /// Convert to the half-open `usize` range used by [`object_store`]
    pub fn to_std_range(&self) -> std::ops::Range<usize> {
        self.start as usize..(self.end as usize + 1)
    }
}

impl Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}-{}]", self.start, self.end)
    }
}

/// Coalesce a set of ranges into the minimal equivalent set
///
/// The output is sorted by start, and no two ranges in it overlap or are adjacent. Ranges that
/// are separated by even a single byte are kept apart.
pub fn merge_ranges(ranges: impl IntoIterator<Item = ByteRange>) -> Vec<ByteRange> {
    let mut ranges: Vec<ByteRange> = ranges.into_iter().collect();
    // ByteRange orders by start, then end:
    ranges.sort_unstable();

    let mut merged = Vec::with_capacity(ranges.len());
    let mut iter = ranges.into_iter();
    let Some(mut current) = iter.next() else {
        return merged;
    };
    for next in iter {
        if current.mergeable_with(&next) {
            current.end = current.end.max(next.end);
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);

    merged
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    fn r(start: u64, end: u64) -> ByteRange {
        ByteRange::try_new(start, end).unwrap()
    }

    #[test]
    fn invalid_range_rejected() {
        assert!(ByteRange::try_new(10, 9).is_err());
        assert_eq!(1, r(10, 10).len());
    }

    #[test]
    fn with_len() {
        assert_eq!(Some(r(100, 109)), ByteRange::with_len(100, 10));
        assert_eq!(None, ByteRange::with_len(100, 0));
        assert_eq!(None, ByteRange::with_len(u64::MAX, 2));
    }

    #[test]
    fn merge_empty() {
        assert!(merge_ranges([]).is_empty());
    }

    #[test]
    fn merge_overlapping_and_contiguous_only() {
        let ranges = [
            r(8577000, 8578000),
            r(8578001, 8579000),
            r(4862808, 4966522),
            r(4966523, 5414203),
            r(447784, 899884),
            r(4302424, 4862807),
            r(5414204, 8572063),
            r(8572073, 8574000),
            r(8579001, 8579050),
            r(8579060, 8579080),
        ];

        assert_eq!(
            vec![
                r(447784, 899884),
                // 4302424-4862807, 4862808-4966522, 4966523-5414203, 5414204-8572063
                r(4302424, 8572063),
                // ten byte gap to the previous range is not closed:
                r(8572073, 8574000),
                // 8577000-8578000, 8578001-8579000, 8579001-8579050
                r(8577000, 8579050),
                r(8579060, 8579080),
            ],
            merge_ranges(ranges)
        );
    }

    #[test]
    fn merge_nested_ranges() {
        assert_eq!(
            vec![r(0, 100)],
            merge_ranges([r(10, 20), r(0, 100), r(50, 60), r(100, 100)])
        );
    }

    #[test]
    fn merge_at_u64_max_does_not_overflow() {
        assert_eq!(
            vec![r(u64::MAX - 10, u64::MAX)],
            merge_ranges([r(u64::MAX - 5, u64::MAX), r(u64::MAX - 10, u64::MAX - 6)])
        );
    }

    fn covered_bytes(ranges: &[ByteRange]) -> BTreeSet<u64> {
        ranges.iter().flat_map(|r| r.start..=r.end).collect()
    }

    fn arb_ranges() -> impl Strategy<Value = Vec<ByteRange>> {
        prop::collection::vec(
            (0u64..2_000, 0u64..64).prop_map(|(start, len)| r(start, start + len)),
            0..32,
        )
    }

    proptest! {
        #[test]
        fn prop_merge_is_idempotent(ranges in arb_ranges()) {
            let once = merge_ranges(ranges);
            let twice = merge_ranges(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_merge_sorted_and_separated(ranges in arb_ranges()) {
            let merged = merge_ranges(ranges);
            for pair in merged.windows(2) {
                // strictly more than one byte apart:
                prop_assert!(pair[0].end + 1 < pair[1].start);
            }
        }

        #[test]
        fn prop_merge_preserves_covered_bytes(ranges in arb_ranges()) {
            let merged = merge_ranges(ranges.clone());
            prop_assert_eq!(covered_bytes(&ranges), covered_bytes(&merged));
        }
    }
}
