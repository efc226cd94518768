//! Architecture support. Flat 32-bit x86 only: the environment model here
//! (two-level paging, a single self-mapped page directory per address
//! space, software task switching via `iret`) has no portable abstraction
//! worth keeping over more architectures than this one.

pub mod x86;
pub use x86::*;
