#![no_std]
#![no_main]

use core::panic::PanicInfo;

use exo_kernel::{arch, bootstrap, config, sched, serial_println};

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_println!("[KERNEL PANIC] {}", info);
    loop {
        core::hint::spin_loop();
    }
}

#[no_mangle]
pub extern "C" fn _start() -> ! {
    arch::x86::serial::init();
    serial_println!("exo-kernel starting");

    bootstrap::init();

    // No boot loader/ELF loader is wired in yet (both external
    // collaborators per the design notes), so the root environment's
    // `.text` is never populated and it page-faults immediately with no
    // upcall registered -- the scheduler destroys it and falls through to
    // `idle()`. Still exercises the full create -> schedule -> fault path.
    let root = bootstrap::create_root_environment(config::UTEXT)
        .expect("no free environment for root env");
    bootstrap::make_runnable(root);

    sched::run();
}
