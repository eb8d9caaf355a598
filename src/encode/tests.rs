use crate::decode::FrameTable;
use crate::error::Error;
use crate::format::{Abi, BaseRegister, FdeInfo, Flags, PcType, Width, VERSION};
use crate::row::FrameRow;
use crate::test_util::{simple_builder, simple_table_bytes, SIMPLE_TABLE};

use super::FrameTableBuilder;

fn w1() -> FdeInfo {
    FdeInfo::new(Width::W1, PcType::Increment)
}

#[test]
fn serializes_simple_table() {
    assert_eq!(simple_table_bytes(), SIMPLE_TABLE);
}

#[test]
fn empty_table() {
    let bytes = simple_builder().serialize().unwrap();
    assert_eq!(bytes.len(), 28);

    let table = FrameTable::decode(&bytes).unwrap();
    assert_eq!(table.function_count(), 0);
    assert_eq!(
        table.find_row(0x1000),
        Err(Error::NoFunctionFound { pc_offset: 0x1000 })
    );
}

#[test]
fn round_trip() {
    let mut builder = FrameTableBuilder::new(
        VERSION,
        Flags::FDE_SORTED.union(Flags::FRAME_POINTER),
        Abi::Amd64LittleEndian.tag(),
        -16,
        -8,
    )
    .unwrap();

    let functions = [
        (
            0x1000,
            0x40,
            Width::W1,
            vec![
                FrameRow::new(0x0, BaseRegister::Sp, Width::W1).with_cfa(8),
                FrameRow::new(0x1, BaseRegister::Sp, Width::W1).with_cfa(16).with_fp(-16),
                FrameRow::new(0x4, BaseRegister::Fp, Width::W1).with_cfa(16).with_fp(-16),
                FrameRow::new(0x3f, BaseRegister::Sp, Width::W1).with_cfa(8),
            ],
        ),
        (
            0x1040,
            0x2000,
            Width::W2,
            vec![
                FrameRow::new(0x0, BaseRegister::Sp, Width::W1).with_cfa(8),
                FrameRow::new(0x120, BaseRegister::Sp, Width::W2).with_cfa(0x1008).with_ra(-8),
                FrameRow::new(0x1ff0, BaseRegister::Sp, Width::W1).with_cfa(8),
            ],
        ),
        (
            0x10_0000,
            0x2_0000,
            Width::W4,
            vec![
                FrameRow::new(0x0, BaseRegister::Sp, Width::W1).with_cfa(8),
                FrameRow::new(0x1_0000, BaseRegister::Sp, Width::W4)
                    .with_cfa(0x10_0000)
                    .with_ra(-8)
                    .with_fp(-0x8_0000),
                FrameRow::new(0x1_fff0, BaseRegister::Fp, Width::W2)
                    .with_cfa(16)
                    .with_ra(-8)
                    .with_fp(-16)
                    .with_mangled_ra(),
            ],
        ),
        (0x20_0000, 0x10, Width::W1, vec![]),
    ];

    for (start, size, width, rows) in &functions {
        let info = FdeInfo::new(*width, PcType::Increment);
        let function = builder
            .add_function(*start, *size, info, rows.len() as u32)
            .unwrap();
        for row in rows {
            builder.add_row(function, *row).unwrap();
        }
    }

    let bytes = builder.serialize().unwrap();
    let table = FrameTable::decode(&bytes).unwrap();

    assert_eq!(table.version(), VERSION);
    assert_eq!(table.abi(), Abi::Amd64LittleEndian);
    assert_eq!(table.flags(), Flags(0x3));
    assert_eq!(table.fixed_fp_offset(), -16);
    assert_eq!(table.fixed_ra_offset(), -8);
    assert_eq!(table.function_count(), functions.len());

    for (index, (start, size, width, rows)) in functions.iter().enumerate() {
        let fde = table.get_function(index).unwrap();
        assert_eq!(fde.start_offset, *start);
        assert_eq!(fde.size, *size);
        assert_eq!(fde.info.address_width().unwrap(), *width);
        assert_eq!(fde.row_count, rows.len() as u32);

        let decoded = table
            .rows(&fde)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(&decoded, rows);

        for row in rows {
            let pc_offset = start + row.start_offset as i32;
            assert_eq!(
                table.find_row(pc_offset).unwrap(),
                row.with_fixed_offsets(-16, -8),
                "row at {pc_offset:#x}"
            );
        }
    }
}

#[test]
fn round_trip_big_endian() {
    let mut builder =
        FrameTableBuilder::new(VERSION, Flags::FDE_SORTED, Abi::Aarch64BigEndian.tag(), 0, 0)
            .unwrap();
    let function = builder
        .add_function(
            -0x200,
            0x1_0000,
            FdeInfo::new(Width::W2, PcType::Increment).with_pauth_key_b(),
            2,
        )
        .unwrap();
    let rows = [
        FrameRow::new(0x0, BaseRegister::Sp, Width::W1).with_cfa(0),
        FrameRow::new(0x1234, BaseRegister::Fp, Width::W2)
            .with_cfa(0x220)
            .with_ra(-0x218)
            .with_fp(-0x220)
            .with_mangled_ra(),
    ];
    for row in rows {
        builder.add_row(function, row).unwrap();
    }
    let bytes = builder.serialize().unwrap();

    assert_eq!(&bytes[..4], &[0xde, 0xe2, 0x53, 0x46]);

    let table = FrameTable::decode(&bytes).unwrap();
    assert_eq!(table.abi(), Abi::Aarch64BigEndian);
    let fde = table.get_function(0).unwrap();
    assert_eq!(fde.start_offset, -0x200);
    assert!(fde.info.pauth_key_b());
    assert_eq!(table.find_row(-0x200 + 0x1234).unwrap(), rows[1]);
    assert_eq!(table.find_row(-0x1ff).unwrap(), rows[0]);
}

#[test]
fn rejects_unknown_abi() {
    assert_eq!(
        FrameTableBuilder::new(VERSION, Flags::empty(), 0, 0, 0).unwrap_err(),
        Error::UnsupportedAbi { found: 0 }
    );
    assert_eq!(
        FrameTableBuilder::new(VERSION, Flags::empty(), 42, 0, 0).unwrap_err(),
        Error::UnsupportedAbi { found: 42 }
    );
}

#[test]
fn rejects_other_versions() {
    assert_eq!(
        FrameTableBuilder::new(1, Flags::empty(), Abi::Amd64LittleEndian.tag(), 0, 0).unwrap_err(),
        Error::UnsupportedVersion { found: 1 }
    );
}

#[test]
fn sorted_functions_must_not_go_backwards() {
    let mut builder = simple_builder();
    builder.add_function(0x1000, 0x10, w1(), 0).unwrap();
    builder.add_function(0x1000, 0x10, w1(), 0).unwrap();

    assert_eq!(
        builder.add_function(0xfff, 0x1, w1(), 0),
        Err(Error::InvalidOrder {
            function: 2,
            previous_start: 0x1000,
            start: 0xfff,
        })
    );
    assert_eq!(builder.function_count(), 2);
}

#[test]
fn unsorted_functions_may_go_backwards() {
    let mut builder =
        FrameTableBuilder::new(VERSION, Flags::empty(), Abi::Amd64LittleEndian.tag(), 0, -8)
            .unwrap();
    builder.add_function(0x2000, 0x10, w1(), 0).unwrap();
    builder.add_function(0x1000, 0x10, w1(), 0).unwrap();
    assert_eq!(builder.serialize().unwrap().len(), 28 + 2 * 18);
}

#[test]
fn rows_must_not_go_backwards() {
    let mut builder = simple_builder();
    let function = builder.add_function(0x1000, 0x100, w1(), 2).unwrap();
    builder
        .add_row(function, FrameRow::new(0x0, BaseRegister::Sp, Width::W1).with_cfa(8))
        .unwrap();
    builder
        .add_row(function, FrameRow::new(0x10, BaseRegister::Sp, Width::W1).with_cfa(16))
        .unwrap();

    assert_eq!(
        builder.add_row(function, FrameRow::new(0x8, BaseRegister::Sp, Width::W1).with_cfa(8)),
        Err(Error::NonMonotonicRow {
            function: 0,
            row: 2,
            previous_start: 0x10,
            start: 0x8,
        })
    );
    builder.serialize().unwrap();
}

#[test]
fn rows_must_not_share_a_start() {
    let mut builder = simple_builder();
    let function = builder.add_function(0x1000, 0x100, w1(), 1).unwrap();
    builder
        .add_row(function, FrameRow::new(0x10, BaseRegister::Sp, Width::W1).with_cfa(8))
        .unwrap();

    assert_eq!(
        builder.add_row(function, FrameRow::new(0x10, BaseRegister::Sp, Width::W1).with_cfa(16)),
        Err(Error::NonMonotonicRow {
            function: 0,
            row: 1,
            previous_start: 0x10,
            start: 0x10,
        })
    );

    let bytes = builder.serialize().unwrap();
    let table = FrameTable::decode(&bytes).unwrap();
    assert_eq!(table.find_row(0x1010).unwrap().cfa_offset(), Some(8));
}

#[test]
fn rows_must_start_inside_their_function() {
    let mut builder = simple_builder();
    let function = builder.add_function(0x1000, 0x10, w1(), 1).unwrap();

    assert_eq!(
        builder.add_row(function, FrameRow::new(0x20, BaseRegister::Sp, Width::W1).with_cfa(8)),
        Err(Error::RowOutsideFunction {
            function: 0,
            row: 0,
            start: 0x20,
            limit: 0x10,
        })
    );
    assert!(matches!(
        builder.add_row(function, FrameRow::new(0x10, BaseRegister::Sp, Width::W1).with_cfa(8)),
        Err(Error::RowOutsideFunction { start: 0x10, .. })
    ));
    builder
        .add_row(function, FrameRow::new(0xf, BaseRegister::Sp, Width::W1).with_cfa(8))
        .unwrap();

    let empty = builder.add_function(0x1010, 0x0, w1(), 0).unwrap();
    assert!(matches!(
        builder.add_row(empty, FrameRow::new(0x0, BaseRegister::Sp, Width::W1).with_cfa(8)),
        Err(Error::RowOutsideFunction { limit: 0, .. })
    ));

    let bytes = builder.serialize().unwrap();
    let table = FrameTable::decode(&bytes).unwrap();
    assert_eq!(table.find_row(0x100f).unwrap().start_offset, 0xf);
}

#[test]
fn mask_rows_must_start_inside_the_block() {
    let mut builder = simple_builder();
    let info = FdeInfo::new(Width::W1, PcType::Mask);
    let function = builder
        .add_function_with_rep_size(0x1000, 0x100, info, 16, 1)
        .unwrap();

    assert_eq!(
        builder.add_row(function, FrameRow::new(0x10, BaseRegister::Sp, Width::W1).with_cfa(8)),
        Err(Error::RowOutsideFunction {
            function: 0,
            row: 0,
            start: 0x10,
            limit: 16,
        })
    );
    builder
        .add_row(function, FrameRow::new(0xa, BaseRegister::Sp, Width::W1).with_cfa(8))
        .unwrap();
    builder.serialize().unwrap();
}

#[test]
fn row_order_is_per_function() {
    let mut builder = simple_builder();
    let first = builder.add_function(0x1000, 0x100, w1(), 1).unwrap();
    let second = builder.add_function(0x1100, 0x100, w1(), 1).unwrap();
    builder
        .add_row(first, FrameRow::new(0x80, BaseRegister::Sp, Width::W1).with_cfa(8))
        .unwrap();
    builder
        .add_row(second, FrameRow::new(0x0, BaseRegister::Sp, Width::W1).with_cfa(8))
        .unwrap();
    builder.serialize().unwrap();
}

#[test]
fn offsets_must_fit_their_width() {
    let mut builder = simple_builder();
    let function = builder.add_function(0x1000, 0x100, w1(), 1).unwrap();

    assert_eq!(
        builder.add_row(function, FrameRow::new(0x0, BaseRegister::Sp, Width::W1).with_cfa(200)),
        Err(Error::OffsetOverflow {
            function: 0,
            row: 0,
            value: 200,
            width: 1,
        })
    );
    assert_eq!(
        builder.add_row(function, FrameRow::new(0x0, BaseRegister::Sp, Width::W1).with_ra(-129)),
        Err(Error::OffsetOverflow {
            function: 0,
            row: 0,
            value: -129,
            width: 1,
        })
    );

    builder
        .add_row(function, FrameRow::new(0x0, BaseRegister::Sp, Width::W1).with_cfa(100))
        .unwrap();
    builder.serialize().unwrap();
}

#[test]
fn wider_offsets() {
    let mut builder = simple_builder();
    let function = builder.add_function(0x1000, 0x100, w1(), 2).unwrap();

    builder
        .add_row(function, FrameRow::new(0x0, BaseRegister::Sp, Width::W2).with_cfa(200))
        .unwrap();
    assert!(matches!(
        builder.add_row(function, FrameRow::new(0x8, BaseRegister::Sp, Width::W2).with_cfa(40_000)),
        Err(Error::OffsetOverflow { value: 40_000, width: 2, .. })
    ));
    builder
        .add_row(function, FrameRow::new(0x8, BaseRegister::Sp, Width::W4).with_cfa(40_000))
        .unwrap();
    builder.serialize().unwrap();
}

#[test]
fn row_start_must_fit_the_address_width() {
    let mut builder = simple_builder();
    let function = builder.add_function(0x1000, 0x1000, w1(), 1).unwrap();

    assert_eq!(
        builder.add_row(function, FrameRow::new(0x100, BaseRegister::Sp, Width::W1).with_cfa(8)),
        Err(Error::OffsetOverflow {
            function: 0,
            row: 0,
            value: 0x100,
            width: 1,
        })
    );
}

#[test]
fn declared_row_count_must_be_met() {
    let mut builder = simple_builder();
    let function = builder.add_function(0x1000, 0x100, w1(), 2).unwrap();
    builder
        .add_row(function, FrameRow::new(0x0, BaseRegister::Sp, Width::W1).with_cfa(8))
        .unwrap();

    assert_eq!(
        builder.serialize(),
        Err(Error::IncompleteFunction {
            function: 0,
            expected: 2,
            actual: 1,
        })
    );
}

#[test]
fn too_many_rows_is_also_incomplete() {
    let mut builder = simple_builder();
    let function = builder.add_function(0x1000, 0x100, w1(), 0).unwrap();
    builder
        .add_row(function, FrameRow::new(0x0, BaseRegister::Sp, Width::W1).with_cfa(8))
        .unwrap();

    assert_eq!(
        builder.serialize(),
        Err(Error::IncompleteFunction {
            function: 0,
            expected: 0,
            actual: 1,
        })
    );
}

#[test]
fn foreign_handle() {
    let mut other = simple_builder();
    other.add_function(0x0, 0x10, w1(), 0).unwrap();
    let handle = other.add_function(0x10, 0x10, w1(), 0).unwrap();

    let mut builder = simple_builder();
    assert_eq!(
        builder.add_row(handle, FrameRow::new(0x0, BaseRegister::Sp, Width::W1).with_cfa(8)),
        Err(Error::IndexOutOfRange { index: 1, count: 0 })
    );
}

#[test]
fn mask_functions_need_a_block_size() {
    let mut builder = simple_builder();
    let info = FdeInfo::new(Width::W1, PcType::Mask);
    assert!(matches!(
        builder.add_function(0x1000, 0x100, info, 1),
        Err(Error::Malformed { .. })
    ));
    builder
        .add_function_with_rep_size(0x1000, 0x100, info, 16, 0)
        .unwrap();
}

#[test]
fn rejects_unknown_address_width() {
    let mut builder = simple_builder();
    assert_eq!(
        builder.add_function(0x1000, 0x100, FdeInfo(0x3), 0),
        Err(Error::Malformed {
            what: "FDE row address width",
            value: 3,
        })
    );
}
