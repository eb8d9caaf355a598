//! Stack unwinding from a compact frame table instead of DWARF call frame
//! information or frame pointer chains.
//!
//! A frame table stores, for every described function, a few rows saying how
//! to find the CFA, the saved return address and the saved frame pointer at
//! each PC range. [`FrameTableBuilder`] writes tables, [`FrameTable`] reads
//! them, [`find_row`] answers "how do I unwind at this PC" and [`walk::walk`]
//! scans raw stack memory for return addresses when nothing better is
//! available yet.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
extern crate tracing;

mod error;
pub mod format;
mod row;

mod decode;
mod encode;
mod lookup;

pub mod walk;

#[cfg(test)]
mod test_util;

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub mod arch;
#[cfg(all(target_os = "linux", target_pointer_width = "64"))]
pub mod divination;
#[cfg(unix)]
pub mod identify;

pub use decode::{FrameTable, FunctionDescriptor, Header, Rows};
pub use encode::{FrameTableBuilder, FunctionHandle};
pub use error::{Error, Result};
pub use format::{Abi, BaseRegister, Endian, FdeInfo, Flags, FreInfo, PcType, Width};
pub use lookup::{find_function, find_row};
pub use row::FrameRow;
pub use walk::{walk, CandidateFrame, CodeRegion, WalkLimits};
