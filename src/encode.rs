//! Building frame tables.
//!
//! [`FrameTableBuilder`] collects functions and their rows in order, checks
//! the ordering and width invariants as they are added, and lays the result
//! out in the format described in [`crate::format`].

#[cfg(test)]
mod tests;

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::format::{
    self, Abi, Endian, FdeInfo, Flags, PcType, Width, FDE_SIZE, HEADER_SIZE, MAGIC, VERSION,
};
use crate::row::FrameRow;

/// Refers to a function previously added to a [`FrameTableBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionHandle(usize);

impl FunctionHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct PendingFunction {
    start_offset: i32,
    size: u32,
    info: FdeInfo,
    address_width: Width,
    rep_size: u8,
    expected_rows: u32,
    rows: Vec<FrameRow>,
}

/// Incremental builder for a frame table. Not meant to be shared between
/// threads while it is being filled; dropping it discards everything.
#[derive(Debug)]
pub struct FrameTableBuilder {
    flags: Flags,
    abi: Abi,
    fixed_fp_offset: i16,
    fixed_ra_offset: i16,
    functions: Vec<PendingFunction>,
}

impl FrameTableBuilder {
    pub fn new(
        version: u8,
        flags: Flags,
        abi: u8,
        fixed_fp_offset: i16,
        fixed_ra_offset: i16,
    ) -> Result<FrameTableBuilder> {
        if version != VERSION {
            return Err(Error::UnsupportedVersion { found: version });
        }
        let abi = Abi::from_tag(abi)?;

        Ok(FrameTableBuilder {
            flags,
            abi,
            fixed_fp_offset,
            fixed_ra_offset,
            functions: Vec::new(),
        })
    }

    pub fn abi(&self) -> Abi {
        self.abi
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Adds a function covering `[start_offset, start_offset + size)`
    /// relative to the table base, which will hold `expected_rows` rows.
    pub fn add_function(
        &mut self,
        start_offset: i32,
        size: u32,
        info: FdeInfo,
        expected_rows: u32,
    ) -> Result<FunctionHandle> {
        self.add_function_with_rep_size(start_offset, size, info, 0, expected_rows)
    }

    /// Like [`FrameTableBuilder::add_function`], for functions whose rows
    /// describe a block of `rep_size` bytes that repeats.
    pub fn add_function_with_rep_size(
        &mut self,
        start_offset: i32,
        size: u32,
        info: FdeInfo,
        rep_size: u8,
        expected_rows: u32,
    ) -> Result<FunctionHandle> {
        let function = self.functions.len();
        let address_width = info.address_width()?;

        if info.pc_type() == PcType::Mask && rep_size == 0 {
            return Err(Error::Malformed {
                what: "repetition block size",
                value: 0,
            });
        }

        if self.flags.is_sorted() {
            if let Some(previous) = self.functions.last() {
                if start_offset < previous.start_offset {
                    return Err(Error::InvalidOrder {
                        function,
                        previous_start: previous.start_offset,
                        start: start_offset,
                    });
                }
            }
        }

        trace!(function, start_offset, size, ?info, expected_rows, "adding function");

        self.functions.push(PendingFunction {
            start_offset,
            size,
            info,
            address_width,
            rep_size,
            expected_rows,
            rows: Vec::new(),
        });
        Ok(FunctionHandle(function))
    }

    pub fn add_row(&mut self, handle: FunctionHandle, row: FrameRow) -> Result<()> {
        let count = self.functions.len();
        let function = self
            .functions
            .get_mut(handle.0)
            .ok_or(Error::IndexOutOfRange {
                index: handle.0,
                count,
            })?;
        let index = function.rows.len();

        let overflow = |value: i64, width: Width| Error::OffsetOverflow {
            function: handle.0,
            row: index,
            value,
            width: width.bytes() as u8,
        };

        if !function
            .address_width
            .fits_unsigned(u64::from(row.start_offset))
        {
            return Err(overflow(i64::from(row.start_offset), function.address_width));
        }

        let width = row.info.offset_width()?;
        for offset in row.stored_offsets() {
            if !width.fits_signed(i64::from(offset)) {
                return Err(overflow(i64::from(offset), width));
            }
        }

        // A row at or past this limit could never be looked up again.
        let limit = match function.info.pc_type() {
            PcType::Increment => function.size,
            PcType::Mask => u32::from(function.rep_size),
        };
        if row.start_offset >= limit {
            return Err(Error::RowOutsideFunction {
                function: handle.0,
                row: index,
                start: row.start_offset,
                limit,
            });
        }

        if let Some(previous) = function.rows.last() {
            if row.start_offset <= previous.start_offset {
                return Err(Error::NonMonotonicRow {
                    function: handle.0,
                    row: index,
                    previous_start: previous.start_offset,
                    start: row.start_offset,
                });
            }
        }

        trace!(function = handle.0, row = index, ?row, "adding row");
        function.rows.push(row);
        Ok(())
    }

    /// Lays out the finished table. Consumes the builder.
    pub fn serialize(self) -> Result<Vec<u8>> {
        let endian = self.abi.endian();

        for (index, function) in self.functions.iter().enumerate() {
            let actual = u32::try_from(function.rows.len()).unwrap_or(u32::MAX);
            if actual != function.expected_rows {
                return Err(Error::IncompleteFunction {
                    function: index,
                    expected: function.expected_rows,
                    actual,
                });
            }
        }

        let function_count = to_u32(self.functions.len(), "function count")?;

        let mut fres = Vec::new();
        let mut fdes = Vec::with_capacity(self.functions.len() * FDE_SIZE);
        for function in &self.functions {
            let first_row = to_u32(fres.len(), "FRE blob length")?;
            for row in &function.rows {
                write_row(&mut fres, endian, function.address_width, row)?;
            }

            endian.put_u32(&mut fdes, function.start_offset as u32);
            endian.put_u32(&mut fdes, function.size);
            fdes.push(function.info.0);
            fdes.push(function.rep_size);
            endian.put_u32(&mut fdes, function.expected_rows);
            endian.put_u32(&mut fdes, first_row);
        }

        let fre_len = to_u32(fres.len(), "FRE blob length")?;
        let fde_offset = HEADER_SIZE;
        let fre_offset = fde_offset + fdes.len();

        let mut out = Vec::with_capacity(fre_offset + fres.len());
        endian.put_u32(&mut out, MAGIC);
        out.push(VERSION);
        out.push(self.flags.0);
        out.push(self.abi.tag());
        out.push(0);
        endian.put_u16(&mut out, self.fixed_fp_offset as u16);
        endian.put_u16(&mut out, self.fixed_ra_offset as u16);
        endian.put_u32(&mut out, function_count);
        endian.put_u32(&mut out, fre_len);
        endian.put_u32(&mut out, to_u32(fde_offset, "FDE table offset")?);
        endian.put_u32(&mut out, to_u32(fre_offset, "FRE blob offset")?);
        debug_assert_eq!(out.len(), HEADER_SIZE);

        out.extend_from_slice(&fdes);
        out.extend_from_slice(&fres);

        debug!(
            functions = function_count,
            fre_len,
            bytes = out.len(),
            "serialized frame table"
        );
        Ok(out)
    }
}

fn write_row(
    out: &mut Vec<u8>,
    endian: Endian,
    address_width: Width,
    row: &FrameRow,
) -> Result<()> {
    let width = row.info.offset_width()?;
    format::put_unsigned(out, endian, address_width, row.start_offset);
    out.push(row.info.0);
    for offset in row.stored_offsets() {
        format::put_signed(out, endian, width, offset);
    }
    Ok(())
}

fn to_u32(value: usize, what: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Malformed {
        what,
        value: u32::MAX,
    })
}
