use crate::format::Endian;

/// Size of the words the walker reads. Every supported ABI is 64-bit.
pub const WORD_SIZE: u64 = 8;

/// Read access to the stack being walked.
///
/// Implementations return `None` for any address they cannot read; the
/// walker takes that as the end of the stack.
pub trait StackMemory {
    fn read_word(&self, addr: u64) -> Option<u64>;
}

impl<M: StackMemory + ?Sized> StackMemory for &M {
    fn read_word(&self, addr: u64) -> Option<u64> {
        (**self).read_word(addr)
    }
}

/// A copy of some stack memory, as captured by a profiler or found in a
/// core dump. `base` is the address the first byte was read from.
#[derive(Debug, Clone, Copy)]
pub struct SliceStack<'a> {
    base: u64,
    bytes: &'a [u8],
    endian: Endian,
}

impl<'a> SliceStack<'a> {
    pub fn new(base: u64, bytes: &'a [u8], endian: Endian) -> Self {
        SliceStack {
            base,
            bytes,
            endian,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// One past the last readable address.
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.bytes.len() as u64)
    }
}

impl StackMemory for SliceStack<'_> {
    fn read_word(&self, addr: u64) -> Option<u64> {
        let offset = usize::try_from(addr.checked_sub(self.base)?).ok()?;
        let word = self.bytes.get(offset..)?.first_chunk::<8>()?;
        Some(self.endian.u64(*word))
    }
}

/// The memory of the running process, restricted to `[low, high)`.
#[derive(Debug, Clone, Copy)]
pub struct LiveStack {
    low: u64,
    high: u64,
}

impl LiveStack {
    /// # Safety
    /// Every byte in `[low, high)` must be mapped and readable for as long
    /// as the `LiveStack` is used.
    pub unsafe fn new(low: u64, high: u64) -> Self {
        LiveStack { low, high }
    }
}

impl StackMemory for LiveStack {
    fn read_word(&self, addr: u64) -> Option<u64> {
        if addr < self.low || addr.checked_add(WORD_SIZE)? > self.high {
            return None;
        }
        let ptr = core::ptr::with_exposed_provenance::<u64>(usize::try_from(addr).ok()?);
        // SAFETY: `new` made the caller promise that the range is readable,
        // and we just checked that the whole word is inside it.
        Some(unsafe { ptr.read_unaligned() })
    }
}
