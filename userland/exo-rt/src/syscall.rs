//! Typed wrappers around the raw `int 0x30` trap. Call number in `eax`,
//! up to five arguments in `edx, ecx, ebx, edi, esi`, return value back in
//! `eax` -- the same convention `syscall::dispatch` decodes kernel-side.

use crate::abi::{decode, PteFlags, Result, SyscallNum, T_SYSCALL};

/// Issue the trap with up to five arguments. Unused trailing arguments are
/// zero; the kernel ignores arguments a call doesn't define.
#[inline]
fn raw_syscall(num: SyscallNum, a1: u32, a2: u32, a3: u32, a4: u32, a5: u32) -> isize {
    let ret: i32;
    // SAFETY: `int T_SYSCALL` is the kernel's designated syscall gate (DPL
    // 3, installed by `idt::init`); it never faults regardless of argument
    // values -- a bad pointer argument is validated and turned into an
    // `Inval` return, not a trap into undefined behavior.
    unsafe {
        core::arch::asm!(
            "int {vec}",
            vec = const T_SYSCALL,
            inout("eax") num as u32 => ret,
            in("edx") a1,
            in("ecx") a2,
            in("ebx") a3,
            in("edi") a4,
            in("esi") a5,
        );
    }
    ret as isize
}

pub fn cputs(s: &[u8]) {
    raw_syscall(
        SyscallNum::Cputs,
        s.as_ptr() as u32,
        s.len() as u32,
        0,
        0,
        0,
    );
}

pub fn cgetc() -> i32 {
    raw_syscall(SyscallNum::Cgetc, 0, 0, 0, 0, 0) as i32
}

pub fn getenvid() -> u32 {
    raw_syscall(SyscallNum::GetEnvId, 0, 0, 0, 0, 0) as u32
}

pub fn env_destroy(id: u32) -> Result<()> {
    decode(raw_syscall(SyscallNum::EnvDestroy, id, 0, 0, 0, 0)).map(|_| ())
}

pub fn yield_now() {
    raw_syscall(SyscallNum::Yield, 0, 0, 0, 0, 0);
}

pub fn page_alloc(env: u32, va: u32, perm: PteFlags) -> Result<()> {
    decode(raw_syscall(
        SyscallNum::PageAlloc,
        env,
        va,
        perm.bits(),
        0,
        0,
    ))
    .map(|_| ())
}

pub fn page_map(src: u32, src_va: u32, dst: u32, dst_va: u32, perm: PteFlags) -> Result<()> {
    decode(raw_syscall(
        SyscallNum::PageMap,
        src,
        src_va,
        dst,
        dst_va,
        perm.bits(),
    ))
    .map(|_| ())
}

pub fn page_unmap(env: u32, va: u32) -> Result<()> {
    decode(raw_syscall(SyscallNum::PageUnmap, env, va, 0, 0, 0)).map(|_| ())
}

pub fn exofork() -> Result<u32> {
    decode(raw_syscall(SyscallNum::Exofork, 0, 0, 0, 0, 0)).map(|id| id as u32)
}

pub fn env_set_status(env: u32, status: u32) -> Result<()> {
    decode(raw_syscall(SyscallNum::EnvSetStatus, env, status, 0, 0, 0)).map(|_| ())
}

/// `tf` must point at a structure matching the kernel's `TrapFrame` layout
/// exactly (see `arch/x86/context.rs`); there is no type-level link between
/// the two crates to enforce this.
pub fn env_set_trapframe(env: u32, tf: *const u8) -> Result<()> {
    decode(raw_syscall(
        SyscallNum::EnvSetTrapframe,
        env,
        tf as u32,
        0,
        0,
        0,
    ))
    .map(|_| ())
}

pub fn env_set_pgfault_upcall(env: u32, upcall: u32) -> Result<()> {
    decode(raw_syscall(
        SyscallNum::EnvSetPgfaultUpcall,
        env,
        upcall,
        0,
        0,
        0,
    ))
    .map(|_| ())
}

pub fn env_snapshot(env: u32) -> Result<usize> {
    decode(raw_syscall(SyscallNum::EnvSnapshot, env, 0, 0, 0, 0)).map(|id| id as usize)
}

pub fn env_resume(env: u32, snapshot_id: usize) -> Result<()> {
    decode(raw_syscall(
        SyscallNum::EnvResume,
        env,
        snapshot_id as u32,
        0,
        0,
        0,
    ))
    .map(|_| ())
}

pub fn ipc_recv(dstva: u32) -> Result<()> {
    decode(raw_syscall(SyscallNum::IpcRecv, dstva, 0, 0, 0, 0)).map(|_| ())
}

pub fn ipc_try_send(dst: u32, value: u32, srcva: u32, perm: PteFlags) -> Result<()> {
    decode(raw_syscall(
        SyscallNum::IpcTrySend,
        dst,
        value,
        srcva,
        perm.bits(),
        0,
    ))
    .map(|_| ())
}

pub fn time_msec() -> u64 {
    raw_syscall(SyscallNum::TimeMsec, 0, 0, 0, 0, 0) as u64
}

pub fn net_transmit(data: &[u8]) -> Result<()> {
    decode(raw_syscall(
        SyscallNum::NetTransmit,
        data.as_ptr() as u32,
        data.len() as u32,
        0,
        0,
        0,
    ))
    .map(|_| ())
}

pub fn net_recv(buf: &mut [u8]) -> Result<usize> {
    decode(raw_syscall(
        SyscallNum::NetRecv,
        buf.as_mut_ptr() as u32,
        buf.len() as u32,
        0,
        0,
        0,
    ))
    .map(|n| n as usize)
}
