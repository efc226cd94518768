//! Memory management integration tests: the frame allocator's refcounting
//! and the two-level page table's map/unmap/lookup behavior, run against a
//! fully booted kernel's address space.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use exo_kernel::mm::frame_allocator::FRAME_ALLOCATOR;
use exo_kernel::mm::page_table::{AddressSpace, PteFlags};
use exo_kernel::{bootstrap, exit_qemu, mm, serial_println, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting memory tests...");

    bootstrap::init();

    test_frame_alloc_is_unique();
    test_frame_refcount_survives_until_last_decref();
    test_address_space_map_unmap_roundtrip();
    test_remap_decrefs_old_frame();

    serial_println!("All tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn test_frame_alloc_is_unique() {
    let a = FRAME_ALLOCATOR.alloc().expect("alloc a");
    let b = FRAME_ALLOCATOR.alloc().expect("alloc b");
    assert_ne!(a, b);
    FRAME_ALLOCATOR.decref(a);
    FRAME_ALLOCATOR.decref(b);
}

fn test_frame_refcount_survives_until_last_decref() {
    let frame = FRAME_ALLOCATOR.alloc().expect("alloc");
    assert_eq!(FRAME_ALLOCATOR.refcount(frame), 1);
    FRAME_ALLOCATOR.incref(frame);
    assert_eq!(FRAME_ALLOCATOR.refcount(frame), 2);
    FRAME_ALLOCATOR.decref(frame);
    assert_eq!(FRAME_ALLOCATOR.refcount(frame), 1);
    FRAME_ALLOCATOR.decref(frame);
    assert_eq!(FRAME_ALLOCATOR.refcount(frame), 0);
}

fn test_address_space_map_unmap_roundtrip() {
    let kernel_pgdir = mm::kernel_pgdir();
    let mut aspace = AddressSpace::new(&kernel_pgdir).expect("new address space");
    drop(kernel_pgdir);

    let frame = FRAME_ALLOCATOR.alloc().expect("alloc");
    let va = 0x0080_0000u32;
    aspace
        .map(va, frame, PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER)
        .expect("map");

    let pte = aspace.lookup(va).expect("lookup ok").expect("mapped");
    assert_eq!(pte.frame(), frame);
    assert!(pte.flags().contains(PteFlags::WRITABLE));
    assert_eq!(FRAME_ALLOCATOR.refcount(frame), 2); // one from alloc, one from map

    aspace.unmap(va).expect("unmap");
    assert!(aspace.lookup(va).expect("lookup ok").is_none());
    assert_eq!(FRAME_ALLOCATOR.refcount(frame), 1);

    FRAME_ALLOCATOR.decref(frame);
}

/// Mapping a second frame at an already-mapped address decref's the first
/// one rather than leaking it.
fn test_remap_decrefs_old_frame() {
    let kernel_pgdir = mm::kernel_pgdir();
    let mut aspace = AddressSpace::new(&kernel_pgdir).expect("new address space");
    drop(kernel_pgdir);

    let va = 0x0080_1000u32;
    let first = FRAME_ALLOCATOR.alloc().expect("alloc first");
    let second = FRAME_ALLOCATOR.alloc().expect("alloc second");

    aspace.map(va, first, PteFlags::PRESENT | PteFlags::WRITABLE).expect("map first");
    assert_eq!(FRAME_ALLOCATOR.refcount(first), 2);

    aspace.map(va, second, PteFlags::PRESENT | PteFlags::WRITABLE).expect("map second");
    assert_eq!(
        FRAME_ALLOCATOR.refcount(first),
        1,
        "remap must decref the displaced frame"
    );
    assert_eq!(FRAME_ALLOCATOR.refcount(second), 2);

    aspace.unmap(va).expect("unmap");
    FRAME_ALLOCATOR.decref(first);
    FRAME_ALLOCATOR.decref(second);
}
