//! # CPU Access
//!
//! The handful of privileged operations the trap core needs, behind the
//! [`Cpu`] trait so dispatch can be driven by synthetic frames in tests.
//! [`X86Cpu`] is the real implementation for the bare-metal i386 target.

use x86_64::registers::rflags::RFlags;
use x86_64::structures::gdt::SegmentSelector;

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod x86;
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use self::x86::X86Cpu;

/// Operand of `lgdt` / `lidt`.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct PseudoDescriptor {
    pub limit: u16,
    pub base: usize,
}

pub trait Cpu {
    /// Linear address that caused the most recent page fault (`%cr2`).
    fn fault_address(&self) -> u32;

    fn flags(&self) -> RFlags;

    fn interrupts_enabled(&self) -> bool {
        self.flags().contains(RFlags::INTERRUPT_FLAG)
    }

    /// `cld`
    fn clear_direction_flag(&self);

    /// Loads the GDT and reloads every segment register from it.
    ///
    /// # Safety
    /// `gdt` must describe a valid table that outlives its use by the CPU.
    unsafe fn load_gdt(&self, gdt: &PseudoDescriptor, code: SegmentSelector, data: SegmentSelector);

    /// `ltr`
    ///
    /// # Safety
    /// `selector` must name an available TSS descriptor in the loaded GDT.
    unsafe fn load_task_register(&self, selector: SegmentSelector);

    /// `lidt`
    ///
    /// # Safety
    /// `idt` must describe a fully built table that is never modified again.
    unsafe fn load_idt(&self, idt: &PseudoDescriptor);
}
