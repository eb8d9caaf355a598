use crate::encode::FrameTableBuilder;
use crate::format::{Abi, BaseRegister, FdeInfo, Flags, PcType, Width, VERSION};
use crate::row::FrameRow;

/// One sorted amd64 function at `[0x1000, 0x1100)` with rows at 0x0
/// (CFA = SP+8) and 0x10 (CFA = SP+16). The fixed RA offset is -8.
#[rustfmt::skip]
pub(crate) const SIMPLE_TABLE: [u8; 52] = [
    // header
    0x46, 0x53, 0xe2, 0xde, // magic
    2,                      // version
    1,                      // flags: sorted
    3,                      // abi: amd64
    0,                      // reserved
    0x00, 0x00,             // fixed fp offset
    0xf8, 0xff,             // fixed ra offset: -8
    1, 0, 0, 0,             // function count
    6, 0, 0, 0,             // FRE blob length
    28, 0, 0, 0,            // FDE table offset
    46, 0, 0, 0,            // FRE blob offset
    // FDE
    0x00, 0x10, 0, 0,       // start
    0x00, 0x01, 0, 0,       // size
    0x00,                   // info: 1 byte addresses, pc increment
    0,                      // rep size
    2, 0, 0, 0,             // row count
    0, 0, 0, 0,             // first row
    // FREs
    0x00, 0x03, 0x08,       // 0x0: SP, CFA+8
    0x10, 0x03, 0x10,       // 0x10: SP, CFA+16
];

pub(crate) fn simple_builder() -> FrameTableBuilder {
    FrameTableBuilder::new(
        VERSION,
        Flags::FDE_SORTED,
        Abi::Amd64LittleEndian.tag(),
        0,
        -8,
    )
    .unwrap()
}

pub(crate) fn simple_table_bytes() -> alloc::vec::Vec<u8> {
    let mut builder = simple_builder();
    let function = builder
        .add_function(0x1000, 0x100, FdeInfo::new(Width::W1, PcType::Increment), 2)
        .unwrap();
    builder
        .add_row(function, FrameRow::new(0x0, BaseRegister::Sp, Width::W1).with_cfa(8))
        .unwrap();
    builder
        .add_row(function, FrameRow::new(0x10, BaseRegister::Sp, Width::W1).with_cfa(16))
        .unwrap();
    builder.serialize().unwrap()
}

/// xorshift64, so "random" tests fail the same way every time.
pub(crate) struct Rng(u64);

impl Rng {
    pub(crate) fn new(seed: u64) -> Self {
        Rng(seed.wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1)
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub(crate) fn below(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound
    }
}
