use framewind::{
    arch, divination, identify::identify, walk::LiveStack, Abi, BaseRegister, FdeInfo, Flags,
    FrameRow, FrameTable, FrameTableBuilder, PcType, WalkLimits, Width,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(target_arch = "x86_64")]
const ABI: Abi = Abi::Amd64LittleEndian;
#[cfg(target_arch = "aarch64")]
const ABI: Abi = Abi::Aarch64LittleEndian;

fn main() {
    let registry = tracing_subscriber::Registry::default().with(
        EnvFilter::builder()
            .with_default_directive(tracing::Level::DEBUG.into())
            .from_env()
            .unwrap(),
    );

    let tree_layer = tracing_tree::HierarchicalLayer::new(2)
        .with_targets(true)
        .with_bracketed_fields(true);

    registry.with(tree_layer).init();

    let (bytes, code) = coarse_table();
    let table = FrameTable::with_base(&bytes, code.start).unwrap();

    let mut listing = String::new();
    table.dump(&mut listing).unwrap();
    println!("{listing}");

    let pc = arch::program_counter();
    let pc_offset = table.pc_offset_of(pc).unwrap();
    let row = table.find_row(pc_offset).unwrap();
    let cfa = row.cfa(arch::stack_pointer(), arch::frame_pointer());
    println!("row for pc {pc:#x}: {row:?}, cfa would be {cfa:#x?}");

    walk_here(&table, code);
}

/// A table that describes the whole executable segment as one function
/// whose CFA is always SP+8, which is only true right after a call.
fn coarse_table() -> (Vec<u8>, framewind::CodeRegion) {
    let code = divination::code_region(arch::program_counter()).unwrap();
    let size = u32::try_from(code.len()).unwrap();

    let mut builder = FrameTableBuilder::new(2, Flags::FDE_SORTED, ABI.tag(), 0, -8).unwrap();
    let function = builder
        .add_function(0, size, FdeInfo::new(Width::W1, PcType::Increment), 1)
        .unwrap();
    builder
        .add_row(function, FrameRow::new(0, BaseRegister::Sp, Width::W1).with_cfa(8))
        .unwrap();
    (builder.serialize().unwrap(), code)
}

#[inline(never)]
fn walk_here(table: &FrameTable<'_>, code: framewind::CodeRegion) {
    let sp = arch::stack_pointer();
    let (_, high) = divination::stack_bounds().unwrap();
    // SAFETY: everything from our own stack pointer up to the top of the
    // main thread's stack is live.
    let memory = unsafe { LiveStack::new(sp, high) };

    let limits = WalkLimits {
        max_frames: 32,
        max_distance: 16 * 1024,
    };
    for (i, frame) in framewind::walk(table, code, &memory, sp, limits).enumerate() {
        let name = identify(frame.pc)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "<unknown>".to_owned());
        println!(
            "#{i:<2} {:#018x} (at {:#x}) {name} {:?}",
            frame.pc,
            frame.stack_addr,
            frame.row.and_then(|row| row.cfa_offset())
        );
    }
}
