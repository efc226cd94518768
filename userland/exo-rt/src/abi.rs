//! Address-space layout and wire constants shared with the kernel's ABI.
//!
//! No `std`/kernel-crate dependency links user and kernel code together, so
//! these restate the kernel's `config.rs`/`syscall/mod.rs` constants on the
//! user side of the boundary, the way JOS's `inc/memlayout.h`/`inc/trap.h`
//! mirror `kern/pmap.h`/`kern/trap.h` in the reference implementation this
//! kernel is descended from.

use bitflags::bitflags;

pub const PAGE_SIZE: usize = 4096;

pub const UTEXT: u32 = 0x0080_0000;
pub const USTACKTOP: u32 = 0xEEBF_E000;
pub const UXSTACKTOP: u32 = 0xEEBF_F000;
pub const UTOP: u32 = 0xEEC0_0000;

/// Scratch virtual address the CoW fault handler copies a faulting page
/// through. One page below `UTEXT`'s guard region, never otherwise mapped.
pub const PFTEMP: u32 = UTEXT - PAGE_SIZE as u32;

const PDX_SELFMAP: usize = 0x3BD;
pub const UVPT: u32 = (PDX_SELFMAP as u32) << 22;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        const PRESENT  = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER     = 1 << 2;
        const COW      = 1 << 11;
    }
}

pub const ENV_RUNNABLE: u32 = 2;
pub const ENV_NOT_RUNNABLE: u32 = 4;

/// The trap vector `int` targets to reach the kernel's syscall dispatcher.
pub const T_SYSCALL: u32 = 48;

#[repr(u32)]
pub enum SyscallNum {
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

/// Mirrors `KernelError::to_errno`: small fixed negative integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    BadEnv,
    Inval,
    NoMem,
    NoFreeEnv,
    IpcNotRecv,
    TxFull,
    RxEmpty,
    PktTooLong,
    Unknown(isize),
}

impl Error {
    pub fn from_errno(code: isize) -> Self {
        match code {
            -1 => Error::BadEnv,
            -2 => Error::Inval,
            -3 => Error::NoMem,
            -4 => Error::NoFreeEnv,
            -5 => Error::IpcNotRecv,
            -6 => Error::TxFull,
            -7 => Error::RxEmpty,
            -8 => Error::PktTooLong,
            other => Error::Unknown(other),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Turn a raw syscall return value into `Result<isize>`: negative is an
/// error code, non-negative is the payload (identifier, byte count, or 0).
pub fn decode(raw: isize) -> Result<isize> {
    if raw < 0 {
        Err(Error::from_errno(raw))
    } else {
        Ok(raw)
    }
}
