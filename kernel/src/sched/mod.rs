//! Round-robin scheduler. Single CPU, cooperative with respect to kernel
//! code (the kernel never preempts itself); an environment only stops
//! running when it traps back in via syscall, page fault, or `yield`.

use crate::arch;
use crate::config::KSTACK_SIZE;
use crate::process::{self, EnvId, EnvStatus};

/// One static kernel stack, reused across every environment. Safe because
/// the kernel never runs re-entrantly: the previous environment's trap has
/// always fully returned (via `pop_tf`) before the next one can fault back
/// in.
#[repr(align(4096))]
struct KernelStack([u8; KSTACK_SIZE]);
static mut KSTACK: KernelStack = KernelStack([0; KSTACK_SIZE]);

pub fn init() {
    // SAFETY: `KSTACK` is `'static` and exclusively owned by the kernel's
    // trap-entry machinery from this point on.
    let top = unsafe { core::ptr::addr_of!(KSTACK) as u32 + KSTACK_SIZE as u32 };
    arch::x86::gdt::set_kernel_stack(top);
}

/// The scheduler main loop: pick the next runnable environment after the
/// one that was last running, load its address space, and resume it. If
/// none are runnable, halt until an interrupt (e.g. a NIC RX) might make
/// one runnable and re-enter this loop.
pub fn run() -> ! {
    loop {
        let last_index = process::current_id().index();
        match process::table().next_runnable_after(last_index) {
            Some(id) => dispatch(id),
            None => arch::idle(),
        }
    }
}

fn dispatch(id: EnvId) -> ! {
    process::table().with_mut(id, |env| {
        env.status = EnvStatus::Running;
        env.runs += 1;
    });
    process::set_current(id);

    let pgdir_phys = process::table()
        .with(id, |env| {
            env.address_space
                .as_ref()
                .expect("runnable environment has no address space")
                .pgdir_frame
                .addr()
        });
    // SAFETY: `pgdir_phys` is this environment's own, fully populated page
    // directory (kernel half shared, user half whatever it has mapped).
    unsafe {
        core::arch::asm!("mov cr3, {}", in(reg) pgdir_phys, options(nostack, preserves_flags));
    }

    let tf = process::table().with(id, |env| env.tf);
    arch::x86::context::pop_tf(&tf)
}
