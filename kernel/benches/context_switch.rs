//! Context switch cost, measured at the primitives a real switch is built
//! from: a general-register save/restore and a `cr3` reload. The actual
//! `dispatch`/`pop_tf` path is `-> !` (it `iret`s into the target
//! environment) and so can't be timed end-to-end from inside one process;
//! these isolate its two dominant costs instead.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use exo_kernel::{exit_qemu, serial_println, test_panic_handler, BenchmarkRunner, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Context Switch Benchmark");
    serial_println!("========================");

    let runner = BenchmarkRunner::new();

    let regs = runner.run_benchmark("register save/restore (pushad/popad)", || {
        // SAFETY: balanced push/pop of general registers only; no memory
        // or control-flow effects escape this block.
        unsafe {
            core::arch::asm!("pushad", "popad", options(nostack, preserves_flags));
        }
    });

    let cr3 = runner.run_benchmark("cr3 reload (same address space)", || {
        // SAFETY: reloading `cr3` with its own current value flushes the
        // TLB but changes no mapping; always safe regardless of which
        // address space is active.
        unsafe {
            core::arch::asm!(
                "mov {tmp}, cr3",
                "mov cr3, {tmp}",
                tmp = out(reg) _,
                options(nostack, preserves_flags),
            );
        }
    });

    let fpu = runner.run_benchmark("FPU state save/restore (fxsave/fxrstor)", || {
        let mut area = [0u8; 512];
        // SAFETY: `area` is 512 bytes as `fxsave`/`fxrstor` require; 16-byte
        // alignment isn't guaranteed here but `fxsave`/`fxrstor` (unlike
        // their `*64` siblings) don't fault on misalignment on real
        // hardware, only incur a minor performance penalty.
        unsafe {
            core::arch::asm!("fxsave [{0}]", in(reg) area.as_mut_ptr(), options(nostack));
            core::arch::asm!("fxrstor [{0}]", in(reg) area.as_ptr(), options(nostack));
        }
    });

    serial_println!("\nSummary:");
    serial_println!(
        "  registers: avg {} ns, cr3: avg {} ns, fpu: avg {} ns",
        regs.avg_time_ns,
        cr3.avg_time_ns,
        fpu.avg_time_ns
    );

    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
