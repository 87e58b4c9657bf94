mod common;

use common::{load, run_stream, DramBuf};
use weft_device::Device;
use weft_isa::config;
use weft_isa::{Insn, MemInsn, MemoryId, Opcode};

/// Column padding: `[pad, data, data, pad]`, one padded row.
#[test]
fn x_padding_zero_fills_around_the_interior() {
    let mut data = vec![10u8; 16];
    data.extend_from_slice(&[20u8; 16]);
    let src = DramBuf::with_bytes(&data);
    let mut device = Device::new();

    let mut op = load(MemoryId::Inp, 0, src.elem_base(config::INP_ELEM_BYTES), 2);
    op.x_pad_0 = 1;
    op.x_pad_1 = 1;
    let rc = run_stream(&mut device, &[Insn::Load(op).encode()]);

    assert_eq!(rc, 0);
    assert_eq!(device.inp_lanes(0), vec![0; 16]);
    assert_eq!(device.inp_lanes(1), vec![10; 16]);
    assert_eq!(device.inp_lanes(2), vec![20; 16]);
    assert_eq!(device.inp_lanes(3), vec![0; 16]);
}

/// Full 2-D padding: pad rows above and below, pad columns left and right,
/// interior matching the strided DRAM source element-for-element.
#[test]
fn padded_window_zeroes_border_and_copies_interior() {
    // Source layout: 2 rows of 3 elements at stride 3; values 1..=6.
    let mut data = Vec::new();
    for value in 1..=6u8 {
        data.extend_from_slice(&[value; 16]);
    }
    let src = DramBuf::with_bytes(&data);
    let mut device = Device::new();

    // Dirty the destination window first so stale bytes must be zeroed.
    let dirty = DramBuf::with_bytes(&vec![0x5au8; 20 * config::INP_ELEM_BYTES]);
    run_stream(
        &mut device,
        &[Insn::Load(load(MemoryId::Inp, 0, dirty.elem_base(config::INP_ELEM_BYTES), 20)).encode()],
    );

    let op = MemInsn {
        opcode: Opcode::Load,
        memory_type: MemoryId::Inp,
        sram_base: 0,
        dram_base: src.elem_base(config::INP_ELEM_BYTES),
        y_size: 2,
        x_size: 3,
        x_stride: 3,
        y_pad_0: 1,
        y_pad_1: 1,
        x_pad_0: 1,
        x_pad_1: 0,
        ..MemInsn::default()
    };
    run_stream(&mut device, &[Insn::Load(op).encode()]);

    // Window is (1+2+1) rows x (1+3+0) columns = 16 elements.
    let expected: [i32; 16] = [
        0, 0, 0, 0, // leading pad row
        0, 1, 2, 3, // pad column + first source row
        0, 4, 5, 6, // pad column + second source row
        0, 0, 0, 0, // trailing pad row
    ];
    for (elem, &want) in expected.iter().enumerate() {
        assert_eq!(
            device.inp_lanes(elem as u32),
            vec![want; 16],
            "element {elem}"
        );
    }
    // Elements past the window keep their previous contents.
    assert_eq!(device.inp_lanes(16), vec![0x5a; 16]);
}

/// A load window whose padded extent overruns the tile depth is fatal.
#[test]
fn out_of_bounds_window_is_fatal() {
    let src = DramBuf::with_bytes(&vec![0u8; config::INP_ELEM_BYTES]);
    let mut device = Device::new();

    let mut op = load(MemoryId::Inp, config::INP_BUFF_DEPTH - 1, src.elem_base(config::INP_ELEM_BYTES), 1);
    op.y_pad_1 = 1;
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        run_stream(&mut device, &[Insn::Load(op).encode()]);
    }));
    assert!(result.is_err());
}
