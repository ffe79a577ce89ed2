//! i386 trap handling core: gate table and per-CPU trap context, entry
//! stubs, frame diagnostics, the system call bridge and trap dispatch.
//!
//! Everything above the CPU is reached through the traits in [`env`] and
//! [`syscalls`], and every privileged instruction through [`arch::Cpu`], so
//! the dispatch logic runs unchanged on the host under `cargo test`.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod console;
pub mod env;
pub mod interrupts;
pub mod kernel;
pub mod syscalls;
pub mod trap;

#[cfg(test)]
mod testing;

pub use env::{EnvId, EnvStatus, Environments, Monitor, TrapServices};
pub use interrupts::{FrameDump, TrapFrame, TrapNumber};
pub use trap::{Fatal, TrapDispatcher, TrapOutcome};
