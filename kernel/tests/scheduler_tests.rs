//! Scheduler integration tests: round-robin ordering and status
//! transitions over the real environment table.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use exo_kernel::process::{self, EnvId, EnvStatus};
use exo_kernel::{bootstrap, exit_qemu, serial_println, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting scheduler tests...");

    bootstrap::init();

    test_next_runnable_wraps_around();
    test_dying_environment_is_skipped();
    test_no_runnable_returns_none();

    serial_println!("All tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

/// Three freshly created environments become runnable in the order they
/// were created, and the scan wraps back to the first once it passes the
/// last.
fn test_next_runnable_wraps_around() {
    let a = process::create(EnvId::NONE, 0x0080_0000).expect("create a");
    let b = process::create(EnvId::NONE, 0x0080_0000).expect("create b");
    let c = process::create(EnvId::NONE, 0x0080_0000).expect("create c");
    for id in [a, b, c] {
        process::table().with_mut(id, |env| env.status = EnvStatus::Runnable);
    }

    let first = process::table()
        .next_runnable_after(a.index())
        .expect("b runnable");
    assert_eq!(first, b);
    let second = process::table()
        .next_runnable_after(first.index())
        .expect("c runnable");
    assert_eq!(second, c);
    let third = process::table()
        .next_runnable_after(second.index())
        .expect("wraps back to a");
    assert_eq!(third, a);

    process::destroy(a);
    process::destroy(b);
    process::destroy(c);
}

/// A `Dying` environment is never handed back by `next_runnable_after`.
fn test_dying_environment_is_skipped() {
    let a = process::create(EnvId::NONE, 0x0080_0000).expect("create a");
    let b = process::create(EnvId::NONE, 0x0080_0000).expect("create b");
    process::table().with_mut(a, |env| env.status = EnvStatus::Runnable);
    process::table().with_mut(b, |env| env.status = EnvStatus::Runnable);

    process::table().mark_dying(a);
    let next = process::table()
        .next_runnable_after(a.index())
        .expect("b still runnable");
    assert_eq!(next, b);

    process::destroy(a);
    process::destroy(b);
}

/// With nothing runnable, the scan returns `None` rather than looping
/// forever.
fn test_no_runnable_returns_none() {
    let a = process::create(EnvId::NONE, 0x0080_0000).expect("create a");
    // Left `NotRunnable`: `create` never flips status itself.
    assert!(process::table().next_runnable_after(a.index()).is_none());
    process::destroy(a);
}
