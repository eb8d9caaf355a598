//! Finding the unwind row for a program counter.
//!
//! Lookup happens in two steps. First the function descriptor that owns the
//! PC is located, by binary search when the table says its descriptors are
//! sorted and by a linear scan otherwise. Then the rows of that function are
//! scanned for the last one starting at or before the PC.
//!
//! Descriptor ranges may nest. The binary search only finds where the PC
//! would go, and the owner is then searched for backwards from there.
//! Lookups that miss every function cost a walk over all descriptors that
//! start before the PC.
//!
//! Rows are variable sized, so the second step is always linear in the
//! number of rows of the one function. Functions rarely have more than a
//! handful.


use crate::decode::{FrameTable, FunctionDescriptor};
use crate::error::{Error, Result};
use crate::format::PcType;
use crate::row::FrameRow;

/// Returns the row that applies at `pc_offset`, an offset from the table
/// base. RA and FP offsets the row does not carry are taken from the table's
/// fixed offsets.
#[instrument(level = "trace", skip(table))]
pub fn find_row(table: &FrameTable<'_>, pc_offset: i32) -> Result<FrameRow> {
    let function = find_function(table, pc_offset)?;
    trace!(?function, "found function");

    let mut offset = (i64::from(pc_offset) - i64::from(function.start_offset)) as u32;
    if function.info.pc_type() == PcType::Mask {
        if function.rep_size == 0 {
            return Err(Error::Malformed {
                what: "repetition block size",
                value: 0,
            });
        }
        offset %= u32::from(function.rep_size);
    }

    let mut found = None;
    for row in table.rows(&function)? {
        let row = row?;
        if row.start_offset > offset {
            break;
        }
        found = Some(row);
    }

    let row = found.ok_or(Error::NoRowFound {
        function: function.index,
    })?;
    trace!(?row, "found row");

    Ok(row.with_fixed_offsets(table.fixed_fp_offset(), table.fixed_ra_offset()))
}

/// Returns the function descriptor whose range contains `pc_offset`. When
/// ranges overlap the one with the greatest start offset wins, and among
/// equal starts the later entry.
pub fn find_function(table: &FrameTable<'_>, pc_offset: i32) -> Result<FunctionDescriptor> {
    let found = if table.flags().is_sorted() {
        search_sorted(table, pc_offset)?
    } else {
        scan(table, pc_offset)?
    };
    found.ok_or(Error::NoFunctionFound { pc_offset })
}

fn search_sorted(table: &FrameTable<'_>, pc_offset: i32) -> Result<Option<FunctionDescriptor>> {
    // Number of descriptors starting at or before the PC.
    let mut base = 0;
    let mut len = table.function_count();
    while len > 0 {
        let half = len / 2;
        let mid = base + half;
        let fde = table.get_function(mid)?;

        trace!(?base, ?len, ?mid, start = fde.start_offset, "binary searching");

        if fde.start_offset <= pc_offset {
            base = mid + 1;
            len -= half + 1;
        } else {
            len = half;
        }
    }

    // Descriptors may nest, so the owner is the closest one below `base`
    // that contains the PC. A miss walks back to the first entry.
    for index in (0..base).rev() {
        let fde = table.get_function(index)?;
        if fde.contains(pc_offset) {
            return Ok(Some(fde));
        }
    }
    Ok(None)
}

fn scan(table: &FrameTable<'_>, pc_offset: i32) -> Result<Option<FunctionDescriptor>> {
    let mut found: Option<FunctionDescriptor> = None;
    for fde in table.functions() {
        let fde = fde?;
        if !fde.contains(pc_offset) {
            continue;
        }
        if found.map_or(true, |found| fde.start_offset >= found.start_offset) {
            found = Some(fde);
        }
    }
    Ok(found)
}
