//! The on-disk layout of a frame table.
//!
//! ```text
//! +--------+-----------------------+----------------------------+
//! | header | FDE table             | FRE blob                   |
//! | 28 B   | function_count * 18 B | variable sized row entries |
//! +--------+-----------------------+----------------------------+
//! ```
//!
//! Every multi-byte integer is stored in the endianness of the table's ABI.
//! The header records where the two sub-tables start, so readers must not
//! assume they are contiguous.
//!
//! Header:
//! ```text
//!  0  magic            u32
//!  4  version          u8
//!  5  flags            u8
//!  6  abi              u8
//!  7  reserved         u8
//!  8  fixed_fp_offset  i16
//! 10  fixed_ra_offset  i16
//! 12  function_count   u32
//! 16  fre_len          u32
//! 20  fde_offset       u32
//! 24  fre_offset       u32
//! ```
//!
//! FDE:
//! ```text
//!  0  start_offset     i32   relative to the table base
//!  4  size             u32
//!  8  info             u8    FdeInfo
//!  9  rep_size         u8    repetition block size for PC-mask functions
//! 10  row_count        u32
//! 14  first_row        u32   byte offset into the FRE blob
//! ```
//!
//! FRE:
//! ```text
//! start_offset  1/2/4 bytes, unsigned, width from FdeInfo
//! info          u8, FreInfo
//! offsets       0-3 signed values in the order CFA, RA, FP,
//!               each with the width from FreInfo
//! ```

use core::fmt;

use crate::error::{Error, Result};

pub const MAGIC: u32 = 0xdee2_5346;
/// The only revision of the format this crate reads and writes.
pub const VERSION: u8 = 2;

pub const HEADER_SIZE: usize = 28;
pub const FDE_SIZE: usize = 18;

/// Byte order of the multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub(crate) fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        }
    }

    pub(crate) fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        }
    }

    pub(crate) fn u64(self, bytes: [u8; 8]) -> u64 {
        match self {
            Endian::Little => u64::from_le_bytes(bytes),
            Endian::Big => u64::from_be_bytes(bytes),
        }
    }

    pub(crate) fn put_u16(self, out: &mut alloc::vec::Vec<u8>, value: u16) {
        match self {
            Endian::Little => out.extend_from_slice(&value.to_le_bytes()),
            Endian::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    pub(crate) fn put_u32(self, out: &mut alloc::vec::Vec<u8>, value: u32) {
        match self {
            Endian::Little => out.extend_from_slice(&value.to_le_bytes()),
            Endian::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }
}

/// ABI/arch identifier. It fixes the byte order of the whole table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Abi {
    Aarch64BigEndian = 1,
    Aarch64LittleEndian = 2,
    Amd64LittleEndian = 3,
}

impl Abi {
    pub fn from_tag(tag: u8) -> Result<Abi> {
        match tag {
            1 => Ok(Abi::Aarch64BigEndian),
            2 => Ok(Abi::Aarch64LittleEndian),
            3 => Ok(Abi::Amd64LittleEndian),
            found => Err(Error::UnsupportedAbi { found }),
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn endian(self) -> Endian {
        match self {
            Abi::Aarch64BigEndian => Endian::Big,
            Abi::Aarch64LittleEndian | Abi::Amd64LittleEndian => Endian::Little,
        }
    }
}

/// Header flag bits. Bits this crate does not know are carried along and
/// otherwise ignored.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Flags(pub u8);

impl Flags {
    /// Function descriptors are sorted by start offset.
    pub const FDE_SORTED: Flags = Flags(0x1);
    /// Every described function keeps a frame pointer.
    pub const FRAME_POINTER: Flags = Flags(0x2);

    pub const fn empty() -> Flags {
        Flags(0)
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }

    pub fn is_sorted(self) -> bool {
        self.contains(Flags::FDE_SORTED)
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = f.debug_set();
        if self.contains(Flags::FDE_SORTED) {
            names.entry(&format_args!("FDE_SORTED"));
        }
        if self.contains(Flags::FRAME_POINTER) {
            names.entry(&format_args!("FRAME_POINTER"));
        }
        let unknown = self.0 & !(Flags::FDE_SORTED.0 | Flags::FRAME_POINTER.0);
        if unknown != 0 {
            names.entry(&format_args!("{unknown:#04x}"));
        }
        names.finish()
    }
}

/// Size class of a packed integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W1,
    W2,
    W4,
}

impl Width {
    fn from_bits(bits: u8) -> Option<Width> {
        match bits {
            0 => Some(Width::W1),
            1 => Some(Width::W2),
            2 => Some(Width::W4),
            _ => None,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Width::W1 => 0,
            Width::W2 => 1,
            Width::W4 => 2,
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Width::W1 => 1,
            Width::W2 => 2,
            Width::W4 => 4,
        }
    }

    pub fn fits_signed(self, value: i64) -> bool {
        match self {
            Width::W1 => i8::try_from(value).is_ok(),
            Width::W2 => i16::try_from(value).is_ok(),
            Width::W4 => i32::try_from(value).is_ok(),
        }
    }

    pub fn fits_unsigned(self, value: u64) -> bool {
        match self {
            Width::W1 => u8::try_from(value).is_ok(),
            Width::W2 => u16::try_from(value).is_ok(),
            Width::W4 => u32::try_from(value).is_ok(),
        }
    }
}

/// How the rows of a function map to PCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcType {
    /// Row start offsets are offsets from the function start.
    Increment,
    /// The rows describe one block of `rep_size` bytes that repeats for the
    /// whole function (PLT stubs and similar). The lookup offset is taken
    /// modulo the block size.
    Mask,
}

/// The FDE info byte.
///
/// ```text
/// bits 0-3  FRE start offset width (0 = 1 byte, 1 = 2 bytes, 2 = 4 bytes)
/// bit  4    PC type (0 = increment, 1 = mask)
/// bit  5    aarch64 pointer authentication key (0 = A, 1 = B)
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct FdeInfo(pub u8);

impl FdeInfo {
    pub fn new(address_width: Width, pc_type: PcType) -> FdeInfo {
        let mask = match pc_type {
            PcType::Increment => 0,
            PcType::Mask => 1 << 4,
        };
        FdeInfo(address_width.bits() | mask)
    }

    pub fn with_pauth_key_b(self) -> FdeInfo {
        FdeInfo(self.0 | 1 << 5)
    }

    pub fn address_width(self) -> Result<Width> {
        Width::from_bits(self.0 & 0b1111).ok_or(Error::Malformed {
            what: "FDE row address width",
            value: u32::from(self.0 & 0b1111),
        })
    }

    pub fn pc_type(self) -> PcType {
        if self.0 & (1 << 4) != 0 {
            PcType::Mask
        } else {
            PcType::Increment
        }
    }

    pub fn pauth_key_b(self) -> bool {
        self.0 & (1 << 5) != 0
    }
}

impl fmt::Debug for FdeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} | {:?}", self.address_width(), self.pc_type())
    }
}

/// The register a row's CFA offset is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseRegister {
    Fp,
    Sp,
}

/// The FRE info byte.
///
/// ```text
/// bit  0    base register (0 = FP, 1 = SP)
/// bit  1    CFA offset present
/// bit  2    RA offset present
/// bit  3    FP offset present
/// bits 5-6  offset width (0 = 1 byte, 1 = 2 bytes, 2 = 4 bytes)
/// bit  7    return address is mangled (aarch64 pointer authentication)
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct FreInfo(pub u8);

impl FreInfo {
    const CFA: u8 = 1 << 1;
    const RA: u8 = 1 << 2;
    const FP: u8 = 1 << 3;
    const MANGLED_RA: u8 = 1 << 7;

    pub fn new(base: BaseRegister, width: Width) -> FreInfo {
        let base = match base {
            BaseRegister::Fp => 0,
            BaseRegister::Sp => 1,
        };
        FreInfo(base | width.bits() << 5)
    }

    pub(crate) fn with_present(self, cfa: bool, ra: bool, fp: bool) -> FreInfo {
        let mut bits = self.0 & !(Self::CFA | Self::RA | Self::FP);
        if cfa {
            bits |= Self::CFA;
        }
        if ra {
            bits |= Self::RA;
        }
        if fp {
            bits |= Self::FP;
        }
        FreInfo(bits)
    }

    pub(crate) fn with_mangled_ra(self, mangled: bool) -> FreInfo {
        if mangled {
            FreInfo(self.0 | Self::MANGLED_RA)
        } else {
            FreInfo(self.0 & !Self::MANGLED_RA)
        }
    }

    pub fn base_register(self) -> BaseRegister {
        if self.0 & 1 == 0 {
            BaseRegister::Fp
        } else {
            BaseRegister::Sp
        }
    }

    pub fn offset_width(self) -> Result<Width> {
        let bits = (self.0 >> 5) & 0b11;
        Width::from_bits(bits).ok_or(Error::Malformed {
            what: "FRE offset width",
            value: u32::from(bits),
        })
    }

    pub fn has_cfa(self) -> bool {
        self.0 & Self::CFA != 0
    }

    pub fn has_ra(self) -> bool {
        self.0 & Self::RA != 0
    }

    pub fn has_fp(self) -> bool {
        self.0 & Self::FP != 0
    }

    pub fn ra_mangled(self) -> bool {
        self.0 & Self::MANGLED_RA != 0
    }

    pub fn offset_count(self) -> usize {
        usize::from(self.has_cfa()) + usize::from(self.has_ra()) + usize::from(self.has_fp())
    }
}

impl fmt::Debug for FreInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreInfo")
            .field("base", &self.base_register())
            .field("width", &self.offset_width())
            .field("cfa", &self.has_cfa())
            .field("ra", &self.has_ra())
            .field("fp", &self.has_fp())
            .field("mangled_ra", &self.ra_mangled())
            .finish()
    }
}

/// A bounds checked reader over a part of the table.
pub(crate) struct Cursor<'a> {
    pub(crate) data: &'a [u8],
    endian: Endian,
    what: &'static str,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8], endian: Endian, what: &'static str) -> Self {
        Cursor { data, endian, what }
    }

    fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let Some((head, rest)) = self.data.split_first_chunk::<N>() else {
            return Err(Error::Truncated {
                what: self.what,
                needed: N,
                len: self.data.len(),
            });
        };
        self.data = rest;
        Ok(*head)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes()?;
        Ok(self.endian.u16(bytes))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes()?;
        Ok(self.endian.u32(bytes))
    }

    pub(crate) fn unsigned(&mut self, width: Width) -> Result<u32> {
        Ok(match width {
            Width::W1 => u32::from(self.u8()?),
            Width::W2 => u32::from(self.u16()?),
            Width::W4 => self.u32()?,
        })
    }

    pub(crate) fn signed(&mut self, width: Width) -> Result<i32> {
        Ok(match width {
            Width::W1 => i32::from(self.u8()? as i8),
            Width::W2 => i32::from(self.u16()? as i16),
            Width::W4 => self.u32()? as i32,
        })
    }
}

pub(crate) fn put_unsigned(
    out: &mut alloc::vec::Vec<u8>,
    endian: Endian,
    width: Width,
    value: u32,
) {
    match width {
        Width::W1 => out.push(value as u8),
        Width::W2 => endian.put_u16(out, value as u16),
        Width::W4 => endian.put_u32(out, value),
    }
}

pub(crate) fn put_signed(out: &mut alloc::vec::Vec<u8>, endian: Endian, width: Width, value: i32) {
    put_unsigned(out, endian, width, value as u32)
}
