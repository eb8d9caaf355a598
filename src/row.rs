use crate::format::{BaseRegister, Cursor, FreInfo, Width};
use crate::error::Result;


/// One frame row entry: the unwind rule for a PC sub-range of a function.
///
/// All three offsets are signed byte offsets. The CFA offset is relative to
/// the base register, the RA and FP offsets are relative to the CFA and say
/// where the caller's return address and frame pointer were saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRow {
    /// Offset of the first PC this row applies to, from the function start.
    pub start_offset: u32,
    /// The info byte as stored in the table.
    pub info: FreInfo,
    cfa_offset: Option<i32>,
    ra_offset: Option<i32>,
    fp_offset: Option<i32>,
}

impl FrameRow {
    pub fn new(start_offset: u32, base: BaseRegister, width: Width) -> FrameRow {
        FrameRow {
            start_offset,
            info: FreInfo::new(base, width),
            cfa_offset: None,
            ra_offset: None,
            fp_offset: None,
        }
    }

    pub fn with_cfa(mut self, offset: i32) -> FrameRow {
        self.cfa_offset = Some(offset);
        self.sync_info()
    }

    pub fn with_ra(mut self, offset: i32) -> FrameRow {
        self.ra_offset = Some(offset);
        self.sync_info()
    }

    pub fn with_fp(mut self, offset: i32) -> FrameRow {
        self.fp_offset = Some(offset);
        self.sync_info()
    }

    pub fn with_mangled_ra(mut self) -> FrameRow {
        self.info = self.info.with_mangled_ra(true);
        self
    }

    fn sync_info(mut self) -> FrameRow {
        self.info = self.info.with_present(
            self.cfa_offset.is_some(),
            self.ra_offset.is_some(),
            self.fp_offset.is_some(),
        );
        self
    }

    pub fn base_register(&self) -> BaseRegister {
        self.info.base_register()
    }

    pub fn cfa_offset(&self) -> Option<i32> {
        self.cfa_offset
    }

    pub fn ra_offset(&self) -> Option<i32> {
        self.ra_offset
    }

    pub fn fp_offset(&self) -> Option<i32> {
        self.fp_offset
    }

    pub fn ra_mangled(&self) -> bool {
        self.info.ra_mangled()
    }

    /// The offsets in storage order.
    pub(crate) fn stored_offsets(&self) -> impl Iterator<Item = i32> {
        [self.cfa_offset, self.ra_offset, self.fp_offset]
            .into_iter()
            .flatten()
    }

    /// Fills the RA and FP offsets the row does not carry from the table's
    /// fixed offsets. A fixed offset of zero means the table has none.
    /// The info byte is left as stored.
    pub fn with_fixed_offsets(mut self, fixed_fp: i16, fixed_ra: i16) -> FrameRow {
        if self.ra_offset.is_none() && fixed_ra != 0 {
            self.ra_offset = Some(i32::from(fixed_ra));
        }
        if self.fp_offset.is_none() && fixed_fp != 0 {
            self.fp_offset = Some(i32::from(fixed_fp));
        }
        self
    }

    /// Computes the CFA from the current stack and frame pointer. `None` for
    /// rows without a CFA rule (the outermost frame).
    pub fn cfa(&self, sp: u64, fp: u64) -> Option<u64> {
        let base = match self.base_register() {
            BaseRegister::Sp => sp,
            BaseRegister::Fp => fp,
        };
        Some(base.wrapping_add_signed(i64::from(self.cfa_offset?)))
    }

    /// Address the caller's return address was saved at.
    pub fn ra_address(&self, cfa: u64) -> Option<u64> {
        Some(cfa.wrapping_add_signed(i64::from(self.ra_offset?)))
    }

    /// Address the caller's frame pointer was saved at.
    pub fn fp_address(&self, cfa: u64) -> Option<u64> {
        Some(cfa.wrapping_add_signed(i64::from(self.fp_offset?)))
    }

    pub(crate) fn parse(data: &mut Cursor<'_>, address_width: Width) -> Result<FrameRow> {
        let start_offset = data.unsigned(address_width)?;
        let info = FreInfo(data.u8()?);
        let width = info.offset_width()?;

        let mut read = |present: bool| -> Result<Option<i32>> {
            if present {
                data.signed(width).map(Some)
            } else {
                Ok(None)
            }
        };
        let cfa_offset = read(info.has_cfa())?;
        let ra_offset = read(info.has_ra())?;
        let fp_offset = read(info.has_fp())?;

        Ok(FrameRow {
            start_offset,
            info,
            cfa_offset,
            ra_offset,
            fp_offset,
        })
    }
}
