//! Network server entry point. Forks off the `input` and `output`
//! environments, each keeping this process's own environment id (the
//! value survives the CoW fork on the stack) as the address to send
//! to/receive from. Grounded on the reference kernel's `net/ns.c`, which
//! spawns these same two children the same way.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    let ns_envid = exo_rt::syscall::getenvid();

    match exo_rt::fork().expect("fork input") {
        0 => exo_net::input_loop(ns_envid),
        _input_id => {}
    }

    match exo_rt::fork().expect("fork output") {
        0 => exo_net::output_loop(ns_envid),
        _output_id => {}
    }

    // The protocol-stack core itself (ARP/IP/TCP handling of what `input`
    // forwards) is out of scope here; this just keeps the server
    // environment alive so `input`/`output` have somewhere to IPC.
    loop {
        exo_rt::syscall::yield_now();
    }
}

#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    exo_rt::syscall::env_destroy(exo_rt::syscall::getenvid()).ok();
    loop {
        core::hint::spin_loop();
    }
}
