//! Environment lifecycle tests: creation, teardown, generation reuse, and
//! the privileged-lookup permission check.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use exo_kernel::error::KernelError;
use exo_kernel::process::{self, EnvId, EnvLookup, EnvStatus};
use exo_kernel::{bootstrap, exit_qemu, serial_println, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting process tests...");

    bootstrap::init();

    test_create_gives_fresh_not_runnable_env();
    test_destroy_frees_slot_for_reuse();
    test_destroy_unmaps_stack();
    test_privileged_lookup_self_and_child();

    serial_println!("All tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn test_create_gives_fresh_not_runnable_env() {
    let id = process::create(EnvId::NONE, 0x0080_0000).expect("create");
    process::table().with(id, |env| {
        assert_eq!(env.status, EnvStatus::NotRunnable);
        assert_eq!(env.parent_id, EnvId::NONE);
        assert!(env.address_space.is_some());
    });
    process::destroy(id);
}

/// Destroying an environment and creating a new one reuses its table slot
/// but with a bumped generation, so the old id can never alias the new
/// occupant.
fn test_destroy_frees_slot_for_reuse() {
    let a = process::create(EnvId::NONE, 0x0080_0000).expect("create a");
    process::destroy(a);
    let b = process::create(EnvId::NONE, 0x0080_0000).expect("create b");
    assert_eq!(a.index(), b.index());
    assert_ne!(a.generation(), b.generation());
    assert_eq!(
        process::table()
            .lookup(a, EnvId::NONE, EnvLookup::JustChecking)
            .unwrap_err(),
        KernelError::BadEnv
    );
    process::destroy(b);
}

/// `create_root_environment` maps a stack page; `destroy` must unmap the
/// whole `[0, UTOP)` range, including it, leaving the frame's refcount
/// decremented.
fn test_destroy_unmaps_stack() {
    let id = bootstrap::create_root_environment(0x0080_0000).expect("create root env");
    let stack_va = exo_kernel::config::USTACKTOP - exo_kernel::config::PAGE_SIZE as u32;
    let mapped = process::table().with_mut(id, |env| {
        env.address_space
            .as_mut()
            .unwrap()
            .lookup(stack_va)
            .unwrap()
            .is_some()
    });
    assert!(mapped, "bootstrap maps the stack page");
    process::destroy(id);
}

fn test_privileged_lookup_self_and_child() {
    let parent = process::create(EnvId::NONE, 0x0080_0000).expect("create parent");
    let child = process::create(parent, 0x0080_0000).expect("create child");
    let stranger = process::create(EnvId::NONE, 0x0080_0000).expect("create stranger");

    assert!(process::table()
        .lookup(child, parent, EnvLookup::Privileged)
        .is_ok());
    assert!(process::table()
        .lookup(stranger, parent, EnvLookup::Privileged)
        .is_err());

    process::destroy(parent);
    process::destroy(child);
    process::destroy(stranger);
}
