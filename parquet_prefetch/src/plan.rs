//! Fetch plans handed to the physical layer
use crate::range::{ByteRange, merge_ranges};

/// An ordered set of merged [`ByteRange`]s to fetch in a single operation
///
/// Plans are immutable once created: the ranges given to [`IoPlan::new`] are merged up front.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoPlan {
    prefetch_ranges: Vec<ByteRange>,
}

impl IoPlan {
    /// A plan with nothing to fetch
    pub const EMPTY: Self = Self {
        prefetch_ranges: Vec::new(),
    };

    pub fn new(ranges: impl IntoIterator<Item = ByteRange>) -> Self {
        Self {
            prefetch_ranges: merge_ranges(ranges),
        }
    }

    pub fn prefetch_ranges(&self) -> &[ByteRange] {
        &self.prefetch_ranges
    }

    pub fn into_prefetch_ranges(self) -> Vec<ByteRange> {
        self.prefetch_ranges
    }

    pub fn is_empty(&self) -> bool {
        self.prefetch_ranges.is_empty()
    }

    /// Total number of bytes the plan will fetch
    pub fn total_bytes(&self) -> u64 {
        self.prefetch_ranges.iter().map(ByteRange::len).sum()
    }
}

impl From<Option<ByteRange>> for IoPlan {
    fn from(range: Option<ByteRange>) -> Self {
        range.map(|r| Self::new([r])).unwrap_or(Self::EMPTY)
    }
}

/// The terminal state of an [`IoPlan`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IoPlanState {
    /// The plan was handed to the physical layer
    Executed,
    /// There was nothing to fetch, prefetching is disabled by policy, or the stage failed
    #[default]
    Skipped,
}

/// Outcome of executing, or declining to execute, an [`IoPlan`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoPlanExecution {
    pub state: IoPlanState,
}

impl IoPlanExecution {
    pub fn executed() -> Self {
        Self {
            state: IoPlanState::Executed,
        }
    }

    pub fn skipped() -> Self {
        Self {
            state: IoPlanState::Skipped,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.state == IoPlanState::Skipped
    }
}
