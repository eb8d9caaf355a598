//! Reading frame tables.
//!
//! [`FrameTable::decode`] validates the header and the extents of the two
//! sub-tables once. Everything after that is a read-only view into the
//! caller's buffer, so a `FrameTable` can be copied around and queried from
//! any number of threads as long as the bytes stay untouched.


use core::fmt::{self, Write};

use crate::error::{Error, Result};
use crate::format::{
    Abi, BaseRegister, Cursor, Endian, FdeInfo, Flags, PcType, Width, FDE_SIZE, HEADER_SIZE,
    MAGIC, VERSION,
};
use crate::row::FrameRow;

/// The fixed-size header at the start of every table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub flags: Flags,
    pub abi: Abi,
    pub fixed_fp_offset: i16,
    pub fixed_ra_offset: i16,
    pub function_count: u32,
    pub fre_len: u32,
    pub fde_offset: u32,
    pub fre_offset: u32,
}

/// A decoded function descriptor entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionDescriptor {
    /// Position of this entry in the FDE table.
    pub index: usize,
    /// Start of the function, relative to the table base.
    pub start_offset: i32,
    pub size: u32,
    pub info: FdeInfo,
    pub rep_size: u8,
    pub row_count: u32,
    /// Byte offset of the function's first row in the FRE blob.
    pub first_row: u32,
}

impl FunctionDescriptor {
    /// One past the last offset of the function. Wider than `i32` because a
    /// function may end exactly at the top of the addressable range.
    pub fn end_offset(&self) -> i64 {
        i64::from(self.start_offset) + i64::from(self.size)
    }

    pub fn contains(&self, pc_offset: i32) -> bool {
        i64::from(self.start_offset) <= i64::from(pc_offset)
            && i64::from(pc_offset) < self.end_offset()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameTable<'a> {
    header: Header,
    endian: Endian,
    fdes: &'a [u8],
    fres: &'a [u8],
    base_vaddr: Option<u64>,
}

impl<'a> FrameTable<'a> {
    #[instrument(skip(data), fields(len = data.len()))]
    pub fn decode(data: &'a [u8]) -> Result<FrameTable<'a>> {
        let Some(magic) = data.first_chunk::<4>() else {
            return Err(Error::Truncated {
                what: "header",
                needed: HEADER_SIZE,
                len: data.len(),
            });
        };

        // The magic is the only field that can be read before the byte order
        // is known, so it doubles as the byte order probe.
        let endian = if Endian::Little.u32(*magic) == MAGIC {
            Endian::Little
        } else if Endian::Big.u32(*magic) == MAGIC {
            Endian::Big
        } else {
            return Err(Error::BadMagic {
                found: Endian::Little.u32(*magic),
            });
        };

        if data.len() < HEADER_SIZE {
            return Err(Error::Truncated {
                what: "header",
                needed: HEADER_SIZE,
                len: data.len(),
            });
        }

        let mut cursor = Cursor::new(&data[4..HEADER_SIZE], endian, "header");
        let version = cursor.u8()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion { found: version });
        }
        let flags = Flags(cursor.u8()?);
        let abi = Abi::from_tag(cursor.u8()?)?;
        if abi.endian() != endian {
            trace!(?abi, ?endian, "magic byte order disagrees with the ABI");
            return Err(Error::BadMagic {
                found: abi.endian().u32(*magic),
            });
        }
        let _reserved = cursor.u8()?;

        let header = Header {
            version,
            flags,
            abi,
            fixed_fp_offset: cursor.u16()? as i16,
            fixed_ra_offset: cursor.u16()? as i16,
            function_count: cursor.u32()?,
            fre_len: cursor.u32()?,
            fde_offset: cursor.u32()?,
            fre_offset: cursor.u32()?,
        };
        trace!(?header);

        let fdes = region(
            data,
            "FDE table",
            header.fde_offset as usize,
            (header.function_count as usize).checked_mul(FDE_SIZE),
        )?;
        let fres = region(
            data,
            "FRE blob",
            header.fre_offset as usize,
            Some(header.fre_len as usize),
        )?;

        debug!(
            functions = header.function_count,
            fre_len = header.fre_len,
            sorted = flags.is_sorted(),
            "decoded frame table"
        );

        Ok(FrameTable {
            header,
            endian,
            fdes,
            fres,
            base_vaddr: None,
        })
    }

    /// Decodes a table and remembers the virtual address it describes
    /// offsets from, as reported by whoever located it.
    pub fn with_base(data: &'a [u8], base_vaddr: u64) -> Result<FrameTable<'a>> {
        Ok(FrameTable {
            base_vaddr: Some(base_vaddr),
            ..FrameTable::decode(data)?
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn version(&self) -> u8 {
        self.header.version
    }

    pub fn flags(&self) -> Flags {
        self.header.flags
    }

    pub fn abi(&self) -> Abi {
        self.header.abi
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn function_count(&self) -> usize {
        self.header.function_count as usize
    }

    pub fn fixed_fp_offset(&self) -> i16 {
        self.header.fixed_fp_offset
    }

    pub fn fixed_ra_offset(&self) -> i16 {
        self.header.fixed_ra_offset
    }

    pub fn base_vaddr(&self) -> Option<u64> {
        self.base_vaddr
    }

    /// Converts an absolute address into an offset from the table base.
    /// `None` without a base address, or when the address is further than
    /// the format's ±2 GiB from it.
    pub fn pc_offset_of(&self, addr: u64) -> Option<i32> {
        let base = self.base_vaddr?;
        i32::try_from(i128::from(addr) - i128::from(base)).ok()
    }

    pub fn get_function(&self, index: usize) -> Result<FunctionDescriptor> {
        let count = self.function_count();
        if index >= count {
            return Err(Error::IndexOutOfRange { index, count });
        }

        let mut data = Cursor::new(&self.fdes[index * FDE_SIZE..], self.endian, "FDE");
        Ok(FunctionDescriptor {
            index,
            start_offset: data.u32()? as i32,
            size: data.u32()?,
            info: FdeInfo(data.u8()?),
            rep_size: data.u8()?,
            row_count: data.u32()?,
            first_row: data.u32()?,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = Result<FunctionDescriptor>> + '_ {
        (0..self.function_count()).map(|index| self.get_function(index))
    }

    /// Iterates over the rows of `function` in storage order.
    pub fn rows(&self, function: &FunctionDescriptor) -> Result<Rows<'a>> {
        let address_width = function.info.address_width()?;
        let Some(data) = self.fres.get(function.first_row as usize..) else {
            return Err(Error::Truncated {
                what: "FRE blob",
                needed: function.first_row as usize,
                len: self.fres.len(),
            });
        };

        Ok(Rows {
            data: Cursor::new(data, self.endian, "FRE"),
            address_width,
            remaining: function.row_count,
        })
    }

    pub fn find_row(&self, pc_offset: i32) -> Result<FrameRow> {
        crate::lookup::find_row(self, pc_offset)
    }

    /// Writes a listing of the table in the spirit of `objdump --sframe`.
    pub fn dump(&self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(out, "Header :")?;
        writeln!(out)?;
        writeln!(out, "  Version: {}", self.header.version)?;
        writeln!(out, "  Flags: {:?}", self.header.flags)?;
        writeln!(out, "  ABI: {:?}", self.header.abi)?;
        if self.header.fixed_fp_offset != 0 {
            writeln!(out, "  CFA fixed FP offset: {}", self.header.fixed_fp_offset)?;
        }
        if self.header.fixed_ra_offset != 0 {
            writeln!(out, "  CFA fixed RA offset: {}", self.header.fixed_ra_offset)?;
        }
        writeln!(out, "  Num FDEs: {}", self.header.function_count)?;
        writeln!(out)?;
        writeln!(out, "Function Index :")?;
        writeln!(out)?;

        for function in self.functions() {
            let function = match function {
                Ok(function) => function,
                Err(err) => {
                    writeln!(out, "  <{err}>")?;
                    continue;
                }
            };
            let base = self.base_vaddr.unwrap_or(0);
            let pc = base.wrapping_add_signed(i64::from(function.start_offset));
            writeln!(
                out,
                "  func idx [{}]: pc = {:#x}, size = {} bytes",
                function.index, pc, function.size
            )?;
            match function.info.pc_type() {
                PcType::Increment => writeln!(out, "  STARTPC           CFA      FP     RA")?,
                PcType::Mask => writeln!(out, "  STARTPC[m]        CFA      FP     RA")?,
            }

            let rows = match self.rows(&function) {
                Ok(rows) => rows,
                Err(err) => {
                    writeln!(out, "  <{err}>")?;
                    continue;
                }
            };
            for row in rows {
                let row = match row {
                    Ok(row) => {
                        row.with_fixed_offsets(self.fixed_fp_offset(), self.fixed_ra_offset())
                    }
                    Err(err) => {
                        writeln!(out, "  <{err}>")?;
                        break;
                    }
                };
                let start_pc = match function.info.pc_type() {
                    PcType::Increment => pc.wrapping_add(u64::from(row.start_offset)),
                    PcType::Mask => u64::from(row.start_offset),
                };
                let Some(cfa) = row.cfa_offset() else {
                    writeln!(out, "  {start_pc:016x}  RA undefined")?;
                    continue;
                };
                let base = match row.base_register() {
                    BaseRegister::Fp => "fp",
                    BaseRegister::Sp => "sp",
                };
                let mut fp = alloc::string::String::new();
                match row.fp_offset() {
                    Some(offset) => write!(fp, "c{offset:+}")?,
                    None => fp.push('u'),
                }
                let mut ra = alloc::string::String::new();
                match row.ra_offset() {
                    Some(offset) => write!(ra, "c{offset:+}")?,
                    None => ra.push('u'),
                }
                if row.ra_mangled() {
                    ra.push_str("[s]");
                }
                let cfa = alloc::format!("{base}+{cfa}");
                writeln!(out, "  {start_pc:016x}  {cfa:8} {fp:6} {ra}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Iterator over the encoded rows of one function.
pub struct Rows<'a> {
    data: Cursor<'a>,
    address_width: Width,
    remaining: u32,
}

impl Iterator for Rows<'_> {
    type Item = Result<FrameRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let row = FrameRow::parse(&mut self.data, self.address_width);
        if row.is_err() {
            self.remaining = 0;
        }
        Some(row)
    }
}

fn region<'a>(
    data: &'a [u8],
    what: &'static str,
    offset: usize,
    len: Option<usize>,
) -> Result<&'a [u8]> {
    let end = len.and_then(|len| offset.checked_add(len));
    match end {
        Some(end) if end <= data.len() => Ok(&data[offset..end]),
        _ => Err(Error::Truncated {
            what,
            needed: end.unwrap_or(usize::MAX),
            len: data.len(),
        }),
    }
}
