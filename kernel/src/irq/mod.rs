//! Trap dispatch: the single entry point every `_alltraps` call lands in.
//! Routes by vector number to the page-fault handler, the syscall table,
//! a stubbed breakpoint/debug monitor, or destroys/panics on anything
//! else depending on which privilege level it came from.

use crate::arch::context::{TrapFrame, FL_IF};
use crate::arch::idt::{T_BRKPT, T_DEBUG, T_PGFLT, T_SYSCALL};
use crate::{process, sched, syscall};

pub fn init() {}

/// Read `cr2`, the faulting linear address left there by the last page
/// fault.
fn read_cr2() -> u32 {
    let cr2: u32;
    // SAFETY: reading `cr2` has no side effects.
    unsafe {
        core::arch::asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags));
    }
    cr2
}

/// Called by `trap_handler_rust` with the on-stack frame `_alltraps` just
/// built. On a normal return, the assembly tail resumes `tf` exactly as
/// given (the fast path: same environment continues). Branches that need
/// to run a *different* environment call [`sched::run`] directly, which
/// never returns -- abandoning this call stack is fine, since nothing
/// downstream of it is ever referenced again.
pub fn dispatch(tf: &mut TrapFrame) {
    // User environments legitimately run with IF set (`TrapFrame::new_user`),
    // so the saved frame only has to show interrupts disabled when the trap
    // itself came from kernel mode -- otherwise it means a trap landed while
    // the kernel was already handling one, which the single static kernel
    // stack can't survive.
    if !tf.from_user_mode() {
        debug_assert!(
            tf.eflags & FL_IF == 0,
            "kernel-mode trap taken with interrupts enabled (re-entrant kernel trap)"
        );
    }

    if tf.from_user_mode() {
        let current = process::current_id();
        process::table().with_mut(current, |env| env.tf = *tf);
    }

    match tf.trapno {
        T_PGFLT => {
            if !crate::mm::page_fault::handle(tf, read_cr2()) {
                sched::run();
            }
        }
        T_BRKPT | T_DEBUG => {
            // The external debug monitor this would hand off to is out of
            // scope; just trace and step past the `int3`/single-step so
            // user code keeps making progress.
            log::trace!("breakpoint/debug trap at {:#x}", tf.eip);
            if tf.trapno == T_BRKPT {
                tf.eip += 1;
            }
        }
        T_SYSCALL => {
            let reschedule = syscall::dispatch(tf);
            if tf.from_user_mode() {
                let current = process::current_id();
                process::table().with_mut(current, |env| env.tf = *tf);
            }
            if reschedule {
                sched::run();
            }
        }
        vec if tf.from_user_mode() => {
            log::warn!(
                "env {:#x}: unhandled trap {} at {:#x}, destroying",
                process::current_id().0,
                vec,
                tf.eip
            );
            process::destroy(process::current_id());
            sched::run();
        }
        vec => panic!("unhandled trap {} in kernel mode at {:#x}", vec, tf.eip),
    }
}
