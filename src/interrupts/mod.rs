//! Trap entry side of the kernel: the vector catalog, the saved frame layout,
//! the assembly entry stubs and the descriptor tables that route the CPU to
//! them.

pub mod entry;
pub mod frame;
pub mod gdt;
pub mod idt;
pub mod vectors;

pub use frame::{FrameDump, PushRegs, TrapFrame};
pub use idt::GateTable;
pub use vectors::{trap_name, TrapNumber};
