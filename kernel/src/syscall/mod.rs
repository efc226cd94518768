//! The closed system-call table: the kernel's sole intentional entry point
//! from user mode. Call number and up to five arguments arrive in general
//! registers; the return value (or negative [`KernelError::to_errno`])
//! goes back the same way.

use crate::arch::context::{TrapFrame, FL_IF};
use crate::arch::gdt::{GD_UD, GD_UT};
use crate::config::{PAGE_SIZE, UTOP};
use crate::error::{KernelError, KernelResult};
use crate::mm::frame_allocator::FRAME_ALLOCATOR;
use crate::mm::page_table::PteFlags;
use crate::process::{self, EnvId, EnvLookup, EnvStatus};
use crate::{net, snapshot};

/// ABI values accepted by `env_set_status`.
pub const ENV_RUNNABLE: u32 = 2;
pub const ENV_NOT_RUNNABLE: u32 = 4;

/// Bits a user caller is allowed to set on a page mapping. Anything else in
/// a caller-supplied permission word is rejected with `Inval`.
const PTE_USER_MASK: u32 = (PteFlags::PRESENT
    | PteFlags::WRITABLE
    | PteFlags::USER
    | PteFlags::WRITE_THROUGH
    | PteFlags::CACHE_DISABLE
    | PteFlags::AVAIL0
    | PteFlags::AVAIL1
    | PteFlags::COW)
    .bits();

#[repr(u32)]
enum SyscallNum {
    Cputs = 0,
    Cgetc = 1,
    GetEnvId = 2,
    EnvDestroy = 3,
    Yield = 4,
    PageAlloc = 5,
    PageMap = 6,
    PageUnmap = 7,
    Exofork = 8,
    EnvSetStatus = 9,
    EnvSetTrapframe = 10,
    EnvSetPgfaultUpcall = 11,
    EnvSnapshot = 12,
    EnvResume = 13,
    IpcRecv = 14,
    IpcTrySend = 15,
    TimeMsec = 16,
    NetTransmit = 17,
    NetRecv = 18,
}

impl TryFrom<u32> for SyscallNum {
    type Error = ();

    fn try_from(n: u32) -> Result<Self, ()> {
        use SyscallNum::*;
        Ok(match n {
            0 => Cputs,
            1 => Cgetc,
            2 => GetEnvId,
            3 => EnvDestroy,
            4 => Yield,
            5 => PageAlloc,
            6 => PageMap,
            7 => PageUnmap,
            8 => Exofork,
            9 => EnvSetStatus,
            10 => EnvSetTrapframe,
            11 => EnvSetPgfaultUpcall,
            12 => EnvSnapshot,
            13 => EnvResume,
            14 => IpcRecv,
            15 => IpcTrySend,
            16 => TimeMsec,
            17 => NetTransmit,
            18 => NetRecv,
            _ => return Err(()),
        })
    }
}

/// Entry point from [`crate::irq::dispatch`] for the syscall trap vector.
/// Returns `true` if the caller must be rescheduled rather than resumed
/// (`yield`, blocking `ipc_recv`, or self-`env_destroy`).
pub fn dispatch(tf: &mut TrapFrame) -> bool {
    let num = tf.regs.eax;
    let a1 = tf.regs.edx;
    let a2 = tf.regs.ecx;
    let a3 = tf.regs.ebx;
    let a4 = tf.regs.edi;
    let a5 = tf.regs.esi;

    let current = process::current_id();
    let (result, reschedule) = match SyscallNum::try_from(num) {
        Ok(call) => handle(call, current, a1, a2, a3, a4, a5),
        Err(()) => (Err(KernelError::Inval), false),
    };

    tf.regs.eax = match result {
        Ok(v) => v as u32,
        Err(e) => e.to_errno() as u32,
    };
    reschedule
}

fn handle(
    call: SyscallNum,
    current: EnvId,
    a1: u32,
    a2: u32,
    a3: u32,
    a4: u32,
    a5: u32,
) -> (KernelResult<isize>, bool) {
    use SyscallNum::*;
    match call {
        Cputs => (sys_cputs(current, a1, a2).map(|()| 0), false),
        Cgetc => (Ok(0), false),
        GetEnvId => (Ok(current.0 as isize), false),
        EnvDestroy => (sys_env_destroy(current, EnvId(a1)).map(|()| 0), false),
        Yield => (Ok(0), sys_yield(current)),
        PageAlloc => (
            sys_page_alloc(current, EnvId(a1), a2, a3).map(|()| 0),
            false,
        ),
        PageMap => (
            sys_page_map(current, EnvId(a1), a2, EnvId(a3), a4, a5).map(|()| 0),
            false,
        ),
        PageUnmap => (sys_page_unmap(current, EnvId(a1), a2).map(|()| 0), false),
        Exofork => (sys_exofork(current).map(|id| id.0 as isize), false),
        EnvSetStatus => (
            sys_env_set_status(current, EnvId(a1), a2).map(|()| 0),
            false,
        ),
        EnvSetTrapframe => (
            sys_env_set_trapframe(current, EnvId(a1), a2 as *const TrapFrame).map(|()| 0),
            false,
        ),
        EnvSetPgfaultUpcall => (
            sys_env_set_pgfault_upcall(current, EnvId(a1), a2).map(|()| 0),
            false,
        ),
        EnvSnapshot => (sys_env_snapshot(current, EnvId(a1)), false),
        EnvResume => (
            sys_env_resume(current, EnvId(a1), a2 as usize).map(|()| 0),
            false,
        ),
        IpcRecv => (sys_ipc_recv(current, a1).map(|()| 0), true),
        IpcTrySend => (
            sys_ipc_try_send(current, EnvId(a1), a2, a3, a4).map(|()| 0),
            false,
        ),
        TimeMsec => (Ok(crate::timer::uptime_ms() as isize), false),
        NetTransmit => (sys_net_transmit(current, a1, a2).map(|()| 0), false),
        NetRecv => (sys_net_recv(current, a1, a2), false),
    }
}

/// Check that every page of `[va, va+len)` is mapped `User|Present` in
/// `env`'s address space. A bad pointer from user code is fatal to that
/// user, not the kernel (§7's asymmetry).
fn check_user_range(env: EnvId, va: u32, len: u32) -> KernelResult<()> {
    if len == 0 {
        return Ok(());
    }
    let end = va.checked_add(len).ok_or(KernelError::Inval)?;
    if end > UTOP {
        return Err(KernelError::Inval);
    }
    let first_page = va & !(PAGE_SIZE as u32 - 1);
    let mut page = first_page;
    while page < end {
        let present = process::table().with_mut(env, |e| {
            let aspace = e.address_space.as_mut().expect("env with no address space");
            aspace.lookup(page)
        })?;
        match present {
            Some(pte) if pte.is_present() && pte.flags().contains(PteFlags::USER) => {}
            _ => return Err(KernelError::Inval),
        }
        page += PAGE_SIZE as u32;
    }
    Ok(())
}

fn sys_cputs(current: EnvId, va: u32, len: u32) -> KernelResult<()> {
    if check_user_range(current, va, len).is_err() {
        process::destroy(current);
        return Err(KernelError::Inval);
    }
    // SAFETY: `check_user_range` just verified every page of `[va, va+len)`
    // is mapped User|Present in the caller's own address space, which is
    // the one currently loaded in `cr3`.
    let bytes = unsafe { core::slice::from_raw_parts(va as *const u8, len as usize) };
    for &b in bytes {
        crate::arch::x86::serial::_print(format_args!("{}", b as char));
    }
    Ok(())
}

fn sys_env_destroy(current: EnvId, target: EnvId) -> KernelResult<()> {
    let id = process::table().lookup(target, current, EnvLookup::Privileged)?;
    process::destroy(id);
    Ok(())
}

/// Returns `true` (caller must reschedule) always: the running environment
/// just gave up the CPU.
fn sys_yield(current: EnvId) -> bool {
    process::table().with_mut(current, |e| e.status = EnvStatus::Runnable);
    true
}

fn sys_page_alloc(current: EnvId, target: EnvId, va: u32, perm: u32) -> KernelResult<()> {
    let id = process::table().lookup(target, current, EnvLookup::Privileged)?;
    if va & (PAGE_SIZE as u32 - 1) != 0 || va >= UTOP || perm & !PTE_USER_MASK != 0 {
        return Err(KernelError::Inval);
    }
    let flags = PteFlags::from_bits_truncate(perm) | PteFlags::PRESENT;
    let frame = FRAME_ALLOCATOR.alloc()?;
    // SAFETY: `frame` was just allocated and is not yet aliased by any PTE.
    unsafe {
        core::ptr::write_bytes(frame.addr() as *mut u8, 0, PAGE_SIZE);
    }
    let result = process::table().with_mut(id, |e| {
        e.address_space
            .as_mut()
            .expect("env with no address space")
            .map(va, frame, flags)
    });
    if result.is_err() {
        FRAME_ALLOCATOR.decref(frame);
    }
    result
}

fn sys_page_map(
    current: EnvId,
    src: EnvId,
    src_va: u32,
    dst: EnvId,
    dst_va: u32,
    perm: u32,
) -> KernelResult<()> {
    let src_id = process::table().lookup(src, current, EnvLookup::Privileged)?;
    let dst_id = process::table().lookup(dst, current, EnvLookup::Privileged)?;
    if src_va & (PAGE_SIZE as u32 - 1) != 0
        || dst_va & (PAGE_SIZE as u32 - 1) != 0
        || src_va >= UTOP
        || dst_va >= UTOP
        || perm & !PTE_USER_MASK != 0
    {
        return Err(KernelError::Inval);
    }
    let src_pte = process::table().with_mut(src_id, |e| {
        e.address_space
            .as_mut()
            .expect("env with no address space")
            .lookup(src_va)
    })?;
    let frame = match src_pte {
        Some(pte) if pte.is_present() => pte.frame(),
        _ => return Err(KernelError::Inval),
    };
    let want_write = perm & PteFlags::WRITABLE.bits() != 0;
    let src_writable = src_pte.unwrap().flags().contains(PteFlags::WRITABLE);
    if want_write && !src_writable {
        return Err(KernelError::Inval);
    }
    let flags = PteFlags::from_bits_truncate(perm) | PteFlags::PRESENT;
    process::table().with_mut(dst_id, |e| {
        e.address_space
            .as_mut()
            .expect("env with no address space")
            .map(dst_va, frame, flags)
    })
}

fn sys_page_unmap(current: EnvId, target: EnvId, va: u32) -> KernelResult<()> {
    let id = process::table().lookup(target, current, EnvLookup::Privileged)?;
    if va & (PAGE_SIZE as u32 - 1) != 0 || va >= UTOP {
        return Err(KernelError::Inval);
    }
    process::table().with_mut(id, |e| {
        e.address_space
            .as_mut()
            .expect("env with no address space")
            .unmap(va)
    })
}

fn sys_exofork(current: EnvId) -> KernelResult<EnvId> {
    process::fork::exofork(process::table(), current)
}

fn sys_env_set_status(current: EnvId, target: EnvId, status: u32) -> KernelResult<()> {
    let id = process::table().lookup(target, current, EnvLookup::Privileged)?;
    let new_status = match status {
        ENV_RUNNABLE => EnvStatus::Runnable,
        ENV_NOT_RUNNABLE => EnvStatus::NotRunnable,
        _ => return Err(KernelError::Inval),
    };
    process::table().with_mut(id, |e| e.status = new_status);
    Ok(())
}

/// Per the flagged bug fix: copy the caller-supplied frame into the
/// environment's saved frame *first*, then sanitize the copy. Sanitizing a
/// local first and copying it in second would let a future refactor drop
/// the sanitize step without anything failing to compile; doing it in this
/// order means the saved frame is never observed in an unsanitized state
/// even transiently.
fn sys_env_set_trapframe(current: EnvId, target: EnvId, tf_va: *const TrapFrame) -> KernelResult<()> {
    let id = process::table().lookup(target, current, EnvLookup::Privileged)?;
    check_user_range(
        current,
        tf_va as u32,
        core::mem::size_of::<TrapFrame>() as u32,
    )?;
    // SAFETY: `check_user_range` validated `[tf_va, tf_va+size)` is mapped
    // User|Present in the caller's own (currently loaded) address space.
    let supplied = unsafe { core::ptr::read(tf_va) };
    process::table().with_mut(id, |e| {
        e.tf = supplied;
        e.tf.cs = GD_UT | 3;
        e.tf.ds = GD_UD | 3;
        e.tf.es = GD_UD | 3;
        e.tf.ss = GD_UD | 3;
        e.tf.eflags = (e.tf.eflags | FL_IF) & !crate::arch::context::FL_IOPL_MASK;
    });
    Ok(())
}

fn sys_env_set_pgfault_upcall(current: EnvId, target: EnvId, func: u32) -> KernelResult<()> {
    let id = process::table().lookup(target, current, EnvLookup::Privileged)?;
    process::table().with_mut(id, |e| e.pgfault_upcall = func);
    Ok(())
}

fn sys_env_snapshot(current: EnvId, target: EnvId) -> KernelResult<isize> {
    let id = process::table().lookup(target, current, EnvLookup::Privileged)?;
    let sid = snapshot::snapshot(id)?;
    Ok(sid.0 as isize)
}

fn sys_env_resume(current: EnvId, target: EnvId, snapshot_id: usize) -> KernelResult<()> {
    let id = process::table().lookup(target, current, EnvLookup::Privileged)?;
    snapshot::resume(id, snapshot::SnapshotId(snapshot_id))
}

fn sys_ipc_recv(current: EnvId, dstva: u32) -> KernelResult<()> {
    if dstva != 0 && (dstva & (PAGE_SIZE as u32 - 1) != 0 || dstva >= UTOP) {
        return Err(KernelError::Inval);
    }
    process::table().with_mut(current, |e| {
        e.ipc_recving = true;
        e.ipc_dstva = dstva;
        e.status = EnvStatus::NotRunnable;
    });
    Ok(())
}

/// `EnvLookup::JustChecking`: sending needs no parent/child authorization,
/// only a valid (non-stale) target id, per §4.3's note on the permission
/// parameter.
fn sys_ipc_try_send(current: EnvId, target: EnvId, value: u32, srcva: u32, perm: u32) -> KernelResult<()> {
    let id = process::table().lookup(target, current, EnvLookup::JustChecking)?;
    let recving = process::table().with(id, |e| e.ipc_recving);
    if !recving {
        return Err(KernelError::IpcNotRecv);
    }

    if srcva != 0 {
        if srcva & (PAGE_SIZE as u32 - 1) != 0 || srcva >= UTOP || perm & !PTE_USER_MASK != 0 {
            return Err(KernelError::Inval);
        }
        let src_pte = process::table().with_mut(current, |e| {
            e.address_space
                .as_mut()
                .expect("env with no address space")
                .lookup(srcva)
        })?;
        let frame = match src_pte {
            Some(pte) if pte.is_present() => pte.frame(),
            _ => return Err(KernelError::Inval),
        };
        let dst_va = process::table().with(id, |e| e.ipc_dstva);
        if dst_va != 0 {
            let flags = PteFlags::from_bits_truncate(perm) | PteFlags::PRESENT;
            process::table().with_mut(id, |e| {
                e.address_space
                    .as_mut()
                    .expect("env with no address space")
                    .map(dst_va, frame, flags)
            })?;
        }
    }

    process::table().with_mut(id, |e| {
        e.ipc_recving = false;
        e.ipc_value = value;
        e.ipc_from = current;
        e.ipc_perm = perm;
        e.status = EnvStatus::Runnable;
    });
    Ok(())
}

fn sys_net_transmit(current: EnvId, va: u32, len: u32) -> KernelResult<()> {
    check_user_range(current, va, len).map_err(|e| {
        process::destroy(current);
        e
    })?;
    // SAFETY: validated above.
    let bytes = unsafe { core::slice::from_raw_parts(va as *const u8, len as usize) };
    net::transmit(bytes)
}

fn sys_net_recv(current: EnvId, va: u32, len: u32) -> KernelResult<isize> {
    if check_user_range(current, va, len).is_err() {
        process::destroy(current);
        return Err(KernelError::Inval);
    }
    let mut tmp = [0u8; crate::config::E1000_RX_BUF_SIZE];
    let cap = (len as usize).min(tmp.len());
    let n = net::receive(&mut tmp[..cap])?;
    // SAFETY: validated above; `n <= cap <= len`.
    unsafe {
        core::ptr::copy_nonoverlapping(tmp.as_ptr(), va as *mut u8, n);
    }
    Ok(n as isize)
}
