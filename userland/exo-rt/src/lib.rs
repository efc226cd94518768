//! User-space runtime for exo-kernel environments: raw syscall stubs and
//! the copy-on-write `fork` library built on top of them.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod abi;
pub mod fork;
pub mod syscall;

pub use abi::{Error, Result};
pub use fork::fork;
