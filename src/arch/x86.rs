use core::arch::asm;

use x86_64::registers::rflags::RFlags;
use x86_64::structures::gdt::SegmentSelector;

use super::{Cpu, PseudoDescriptor};

/// The CPU this kernel is running on.
pub struct X86Cpu;

impl Cpu for X86Cpu {
    fn fault_address(&self) -> u32 {
        let cr2: u32;
        unsafe { asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags)) };
        cr2
    }

    fn flags(&self) -> RFlags {
        let eflags: u32;
        unsafe { asm!("pushfd", "pop {}", out(reg) eflags, options(preserves_flags)) };
        RFlags::from_bits_truncate(u64::from(eflags))
    }

    fn clear_direction_flag(&self) {
        unsafe { asm!("cld", options(nomem, nostack)) };
    }

    unsafe fn load_gdt(
        &self,
        gdt: &PseudoDescriptor,
        code: SegmentSelector,
        data: SegmentSelector,
    ) {
        asm!("lgdt [{}]", in(reg) gdt, options(readonly, nostack, preserves_flags));
        // user segments are loaded by the resume path; the kernel never uses %gs/%fs
        asm!(
            "mov gs, {null:x}",
            "mov fs, {null:x}",
            "mov es, {data:x}",
            "mov ds, {data:x}",
            "mov ss, {data:x}",
            "push {code}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            null = in(reg) 0u32,
            data = in(reg) u32::from(data.0),
            code = in(reg) u32::from(code.0),
            tmp = lateout(reg) _,
        );
    }

    unsafe fn load_task_register(&self, selector: SegmentSelector) {
        asm!("ltr {0:x}", in(reg) selector.0, options(nostack, preserves_flags));
    }

    unsafe fn load_idt(&self, idt: &PseudoDescriptor) {
        asm!("lidt [{}]", in(reg) idt, options(readonly, nostack, preserves_flags));
    }
}
