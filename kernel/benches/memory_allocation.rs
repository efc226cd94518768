//! Allocation cost on both memory paths this kernel has: the fixed-size
//! heap (`linked_list_allocator`, backing `alloc::vec::Vec` and friends)
//! and the physical frame allocator that backs every page mapping.

#![no_std]
#![no_main]

extern crate alloc;

use alloc::vec::Vec;
use core::panic::PanicInfo;

use exo_kernel::mm::frame_allocator::FRAME_ALLOCATOR;
use exo_kernel::{
    bootstrap, exit_qemu, serial_println, test_panic_handler, BenchmarkRunner, QemuExitCode,
};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Memory Allocation Benchmark");
    serial_println!("===========================");

    bootstrap::init();

    let runner = BenchmarkRunner::new();

    let small = runner.run_benchmark("heap alloc 64B", || {
        let v: Vec<u8> = Vec::with_capacity(64);
        core::hint::black_box(&v);
    });
    let medium = runner.run_benchmark("heap alloc 4KiB", || {
        let v: Vec<u8> = Vec::with_capacity(4096);
        core::hint::black_box(&v);
    });
    let frame = runner.run_benchmark("frame alloc+decref", || {
        let f = FRAME_ALLOCATOR.alloc().expect("frame allocator exhausted");
        FRAME_ALLOCATOR.decref(f);
    });

    serial_println!("\nSummary:");
    serial_println!(
        "  64B: avg {} ns, 4KiB: avg {} ns, frame: avg {} ns",
        small.avg_time_ns,
        medium.avg_time_ns,
        frame.avg_time_ns
    );

    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
