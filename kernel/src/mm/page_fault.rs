//! Page-fault handling: dispatch a CoW write fault to the faulting
//! environment's own page-table entry, and build the user-mode page-fault
//! upcall frame for everything else.

use crate::arch::context::TrapFrame;
use crate::config::{UXSTACKTOP, PAGE_SIZE};
use crate::process;

/// The record pushed onto an environment's exception stack before
/// transferring control to its registered page-fault upcall. Field order
/// matches what the upcall's trampoline (in the user fork/runtime library)
/// expects to pop back off.
#[repr(C)]
pub struct UserTrapFrame {
    pub regs: crate::arch::context::PushRegs,
    pub fault_va: u32,
    pub err: u32,
    pub eip: u32,
    pub eflags: u32,
    pub esp: u32,
}

/// Entry point from [`crate::irq::dispatch`] for vector 14. `fault_va` is
/// read from `cr2` by the caller. Returns `true` if `tf` was rewritten to
/// resume at the upcall and the caller should `iret` it as-is, `false` if
/// the faulting environment had no upcall registered and was destroyed --
/// the caller must reschedule rather than resume `tf`.
pub fn handle(tf: &mut TrapFrame, fault_va: u32) -> bool {
    if !tf.from_user_mode() {
        panic!(
            "page fault in kernel mode at {:#x} (eip {:#x})",
            fault_va, tf.eip
        );
    }

    let current = process::current_id();
    let upcall = process::table().with(current, |env| env.pgfault_upcall);

    if upcall == 0 {
        log::warn!(
            "env {:#x}: unhandled page fault at {:#x}, destroying",
            current.0,
            fault_va
        );
        process::destroy(current);
        return false;
    }

    let xstack_page = UXSTACKTOP - PAGE_SIZE as u32;
    let xstack_mapped = process::table().with_mut(current, |env| {
        env.address_space
            .as_mut()
            .expect("running environment has an address space")
            .lookup(xstack_page)
            .expect("lookup(create=false) never allocates, so never fails")
            .map(|pte| pte.is_present())
            .unwrap_or(false)
    });

    if !xstack_mapped {
        log::warn!(
            "env {:#x}: page-fault upcall registered but exception stack not mapped, destroying",
            current.0
        );
        process::destroy(current);
        return false;
    }

    let recursive = tf.esp >= xstack_page && tf.esp < UXSTACKTOP;
    let frame_size = core::mem::size_of::<UserTrapFrame>() as u32;
    // A fault that arrives while already on the exception stack leaves a
    // 4-byte gap below the previous frame, matching the reference kernel's
    // convention so a user trampoline that itself pushes one word before
    // reading the frame can't corrupt the frame beneath it.
    let new_esp = if recursive {
        tf.esp - 4 - frame_size
    } else {
        UXSTACKTOP - frame_size
    };

    let utf = UserTrapFrame {
        regs: tf.regs,
        fault_va,
        err: tf.err,
        eip: tf.eip,
        eflags: tf.eflags,
        esp: tf.esp,
    };

    // SAFETY: `new_esp` lands inside the faulting environment's exception
    // stack page, just confirmed mapped above (the `recursive` case stays
    // within the same page, one frame lower). `cr3` still holds the
    // faulting environment's page directory.
    unsafe {
        core::ptr::write_volatile(new_esp as *mut UserTrapFrame, utf);
    }

    tf.esp = new_esp;
    tf.eip = upcall;
    true
}
