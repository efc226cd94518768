//! Kernel error type.
//!
//! A single closed enum covers every way a system call or kernel-internal
//! operation can fail. Syscall handlers convert it to a small negative
//! integer at the trap boundary (`to_errno`); everything inside the kernel
//! matches on the enum itself.

use core::fmt;

/// Main kernel error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// Target environment id doesn't exist, or the caller isn't authorized
    /// to act on it.
    BadEnv,
    /// Argument out of range, misaligned, carries disallowed permission
    /// bits, or attempts a write-over-readonly upgrade.
    Inval,
    /// Frame, descriptor, or heap exhaustion.
    NoMem,
    /// The environment table is full.
    NoFreeEnv,
    /// `ipc_try_send` targeted an environment not currently blocked in
    /// `ipc_recv`.
    IpcNotRecv,
    /// The NIC transmit ring has no free descriptor.
    TxFull,
    /// The NIC receive ring has no pending packet.
    RxEmpty,
    /// A `net_transmit` payload exceeds the maximum frame size.
    PktTooLong,
}

/// Result type alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    /// Convert to the small negative integer returned across the syscall
    /// ABI boundary. Never used inside the kernel itself -- callers match
    /// on the enum.
    pub const fn to_errno(self) -> isize {
        match self {
            Self::BadEnv => -1,
            Self::Inval => -2,
            Self::NoMem => -3,
            Self::NoFreeEnv => -4,
            Self::IpcNotRecv => -5,
            Self::TxFull => -6,
            Self::RxEmpty => -7,
            Self::PktTooLong => -8,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::BadEnv => "bad environment id",
            Self::Inval => "invalid argument",
            Self::NoMem => "out of memory",
            Self::NoFreeEnv => "no free environment slot",
            Self::IpcNotRecv => "target not blocked in ipc_recv",
            Self::TxFull => "NIC transmit ring full",
            Self::RxEmpty => "NIC receive ring empty",
            Self::PktTooLong => "packet exceeds maximum frame size",
        };
        f.write_str(msg)
    }
}

/// Helper macro for returning a kernel error from `?`-heavy call sites that
/// still want a descriptive name instead of bare `Err(KernelError::Inval)`.
#[macro_export]
macro_rules! bail {
    ($variant:ident) => {
        return Err($crate::error::KernelError::$variant)
    };
}
