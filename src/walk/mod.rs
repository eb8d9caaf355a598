//! Stack walking.
//!
//! There is no unwinder here that follows CFA rules from frame to frame.
//! What this module offers is the bootstrap: a heuristic scan over raw stack
//! memory that proposes return addresses, which is what a profiler has to
//! fall back on when it knows nothing about the current frame yet.

mod heuristic;
mod memory;


pub use heuristic::{walk, CandidateFrame, HeuristicWalk, SCAN_WINDOW_WORDS};
pub use memory::{LiveStack, SliceStack, StackMemory, WORD_SIZE};

/// The executable code a table describes, as `[start, end)` virtual
/// addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRegion {
    pub start: u64,
    pub end: u64,
}

impl CodeRegion {
    pub fn new(start: u64, end: u64) -> Self {
        CodeRegion { start, end }
    }

    pub fn contains(&self, addr: u64) -> bool {
        (self.start..self.end).contains(&addr)
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Caps for a walk. Both bound the work done on garbage stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkLimits {
    pub max_frames: usize,
    /// No word ending more than this many bytes past the start pointer is
    /// read.
    pub max_distance: u64,
}

impl Default for WalkLimits {
    fn default() -> Self {
        WalkLimits {
            max_frames: 10,
            max_distance: 1024,
        }
    }
}
