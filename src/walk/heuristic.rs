//! Heuristic return address scan.
//!
//! Starting at a stack pointer, every word that points into the code region
//! is taken to be a return address. Nothing checks that the word follows a
//! call instruction, so stale return addresses, function pointers and plain
//! integers that happen to look like code addresses all show up as frames.
//! Callers must treat the result as a guess.

use core::iter::FusedIterator;

use super::memory::{StackMemory, WORD_SIZE};
use super::{CodeRegion, WalkLimits};
use crate::decode::FrameTable;
use crate::row::FrameRow;

/// How many words are looked at from each stack position.
pub const SCAN_WINDOW_WORDS: u64 = 8;

/// A word from the stack that looks like a return address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateFrame {
    pub pc: u64,
    /// The stack address the word was read from.
    pub stack_addr: u64,
    /// The row for `pc`, `None` if the table has nothing for it.
    pub row: Option<FrameRow>,
}

impl CandidateFrame {
    pub fn matched(&self) -> bool {
        self.row.is_some()
    }
}

/// Scans `memory` upwards from `start_sp` for return addresses into
/// `code`.
///
/// Table lookups use `pc - code.start` as the offset, so `table` must have
/// been built relative to the start of the code region.
///
/// The returned iterator reads memory lazily, never outside
/// `[start_sp, start_sp + limits.max_distance)`, and yields at most
/// `limits.max_frames` frames. Once it returns `None` it stays exhausted.
pub fn walk<'a, M: StackMemory + ?Sized>(
    table: &FrameTable<'a>,
    code: CodeRegion,
    memory: &'a M,
    start_sp: u64,
    limits: WalkLimits,
) -> HeuristicWalk<'a, M> {
    debug!(
        ?limits,
        "starting heuristic walk over {:#x}..{:#x} from sp={start_sp:#x}",
        code.start,
        code.end
    );
    HeuristicWalk {
        table: *table,
        code,
        memory,
        start_sp,
        sp: start_sp,
        limits,
        frames: 0,
        done: false,
    }
}

pub struct HeuristicWalk<'a, M: ?Sized> {
    table: FrameTable<'a>,
    code: CodeRegion,
    memory: &'a M,
    start_sp: u64,
    sp: u64,
    limits: WalkLimits,
    frames: usize,
    done: bool,
}

/// What one scan of the window found.
enum Scan {
    Candidate { addr: u64, word: u64 },
    Nothing,
    /// The window ran into unreadable memory or the distance cap. Every
    /// later window would stop at the same place.
    End,
}

impl<M: StackMemory + ?Sized> HeuristicWalk<'_, M> {
    /// Number of frames produced so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Whether the word at `addr` lies inside the distance cap.
    fn in_bounds(&self, addr: u64) -> bool {
        let Some(end) = addr.checked_add(WORD_SIZE) else {
            return false;
        };
        end - self.start_sp <= self.limits.max_distance
    }

    fn scan_window(&self) -> Scan {
        for i in 0..SCAN_WINDOW_WORDS {
            let Some(addr) = self.sp.checked_add(i * WORD_SIZE) else {
                return Scan::End;
            };
            if !self.in_bounds(addr) {
                trace!("reached the distance cap at {addr:#x}");
                return Scan::End;
            }
            let Some(word) = self.memory.read_word(addr) else {
                trace!("stack is not readable at {addr:#x}");
                return Scan::End;
            };
            if self.code.contains(word) {
                return Scan::Candidate { addr, word };
            }
        }
        Scan::Nothing
    }

    fn lookup(&self, pc: u64) -> Option<FrameRow> {
        let Ok(pc_offset) = i32::try_from(pc - self.code.start) else {
            trace!("pc {pc:#x} is too far from the code start");
            return None;
        };
        match self.table.find_row(pc_offset) {
            Ok(row) => Some(row),
            Err(err) => {
                trace!(%err, "no row for candidate pc {pc:#x}");
                None
            }
        }
    }
}

impl<M: StackMemory + ?Sized> Iterator for HeuristicWalk<'_, M> {
    type Item = CandidateFrame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.frames >= self.limits.max_frames {
            self.done = true;
            return None;
        }

        loop {
            match self.scan_window() {
                Scan::Candidate { addr, word } => {
                    let frame = CandidateFrame {
                        pc: word,
                        stack_addr: addr,
                        row: self.lookup(word),
                    };
                    trace!(index = self.frames, ?frame, "candidate frame");

                    self.sp = addr + WORD_SIZE;
                    self.frames += 1;
                    return Some(frame);
                }
                Scan::Nothing => {
                    self.sp += WORD_SIZE;
                }
                Scan::End => {
                    debug!(frames = self.frames, "heuristic walk finished");
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

impl<M: StackMemory + ?Sized> FusedIterator for HeuristicWalk<'_, M> {}
