//! # Global Descriptor Table and Task State
//!
//! Flat kernel and user segments plus one TSS per CPU. The TSS only exists to
//! name the stack the CPU switches to when a ring 3 trap enters the kernel.

use bitflags::bitflags;
use spin::Mutex;
use static_assertions::const_assert_eq;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

use crate::arch::{Cpu, PseudoDescriptor};
use crate::config::{TrapConfig, GDT_ENTRIES, GD_KD, GD_KT, GD_TSS0, GD_UD, GD_UT};
use crate::interrupts::idt::GateTable;

/// 32-bit task state segment. Only `esp0`/`ss0` and the I/O map base are
/// used; hardware task switching is not.
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct TaskState {
    pub link: u16,
    _0: u16,
    pub esp0: u32,
    pub ss0: u16,
    _1: u16,
    pub esp1: u32,
    pub ss1: u16,
    _2: u16,
    pub esp2: u32,
    pub ss2: u16,
    _3: u16,
    pub cr3: u32,
    pub eip: u32,
    pub eflags: u32,
    pub eax: u32,
    pub ecx: u32,
    pub edx: u32,
    pub ebx: u32,
    pub esp: u32,
    pub ebp: u32,
    pub esi: u32,
    pub edi: u32,
    pub es: u16,
    _4: u16,
    pub cs: u16,
    _5: u16,
    pub ss: u16,
    _6: u16,
    pub ds: u16,
    _7: u16,
    pub fs: u16,
    _8: u16,
    pub gs: u16,
    _9: u16,
    pub ldt: u16,
    _10: u16,
    pub trap: u16,
    pub iomb: u16,
}

const_assert_eq!(core::mem::size_of::<TaskState>(), 104);

impl TaskState {
    pub const fn new() -> Self {
        Self {
            link: 0,
            _0: 0,
            esp0: 0,
            ss0: 0,
            _1: 0,
            esp1: 0,
            ss1: 0,
            _2: 0,
            esp2: 0,
            ss2: 0,
            _3: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            _4: 0,
            cs: 0,
            _5: 0,
            ss: 0,
            _6: 0,
            ds: 0,
            _7: 0,
            fs: 0,
            _8: 0,
            gs: 0,
            _9: 0,
            ldt: 0,
            _10: 0,
            trap: 0,
            iomb: 0,
        }
    }
}

bitflags! {
    /// Reference: Intel SDM vol. 3, 3.4.5 "Segment Descriptors"
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescriptorFlags: u64 {
        const ACCESSED      = 1 << 40;
        const WRITABLE      = 1 << 41;
        const READABLE      = 1 << 41;
        const EXECUTABLE    = 1 << 43;
        /// S bit: set for code/data, clear for system descriptors (TSS, gates).
        const USER_SEGMENT  = 1 << 44;
        const DPL_RING_3    = 3 << 45;
        const PRESENT       = 1 << 47;
        const DEFAULT_SIZE  = 1 << 54;
        const GRANULARITY   = 1 << 55;
    }
}

/// System descriptor type: available 32-bit TSS.
const STS_T32A: u64 = 0x9;

fn with_base_limit(base: u32, limit: u32) -> u64 {
    let (base, limit) = (u64::from(base), u64::from(limit));
    (limit & 0xFFFF)
        | (base & 0xFF_FFFF) << 16
        | ((limit >> 16) & 0xF) << 48
        | (base >> 24) << 56
}

/// Flat 4GB code or data segment.
pub fn flat_segment(flags: DescriptorFlags, dpl: PrivilegeLevel) -> u64 {
    let flags = flags
        | DescriptorFlags::USER_SEGMENT
        | DescriptorFlags::PRESENT
        | DescriptorFlags::DEFAULT_SIZE
        | DescriptorFlags::GRANULARITY;
    with_base_limit(0, 0xFFFFF) | flags.bits() | (dpl as u64) << 45
}

/// TSS descriptor, byte granular, with the S bit cleared as the CPU requires.
pub fn tss_segment(base: u32, limit: u32) -> u64 {
    with_base_limit(base, limit) | STS_T32A << 40 | DescriptorFlags::PRESENT.bits()
}

pub struct Gdt {
    table: [u64; GDT_ENTRIES],
}

impl Gdt {
    pub const fn empty() -> Self {
        Self { table: [0; GDT_ENTRIES] }
    }

    /// Null, kernel text/data, user text/data. The TSS slot stays empty until
    /// [`init_context`] fills it.
    pub fn kernel() -> Self {
        let mut gdt = Self::empty();
        let (kernel, user) = (PrivilegeLevel::Ring0, PrivilegeLevel::Ring3);
        let text = DescriptorFlags::EXECUTABLE | DescriptorFlags::READABLE;
        let data = DescriptorFlags::WRITABLE;
        gdt.set(GD_KT, flat_segment(text, kernel));
        gdt.set(GD_KD, flat_segment(data, kernel));
        gdt.set(GD_UT, flat_segment(text, user));
        gdt.set(GD_UD, flat_segment(data, user));
        gdt
    }

    pub fn set(&mut self, selector: SegmentSelector, descriptor: u64) {
        self.table[selector.index() as usize] = descriptor;
    }

    pub fn get(&self, selector: SegmentSelector) -> u64 {
        self.table[selector.index() as usize]
    }

    fn pseudo_descriptor(&self) -> PseudoDescriptor {
        PseudoDescriptor {
            limit: (core::mem::size_of::<[u64; GDT_ENTRIES]>() - 1) as u16,
            base: self.table.as_ptr() as usize,
        }
    }
}

/// Descriptor tables owned by one CPU.
pub struct CpuTables {
    pub gdt: Gdt,
    pub tss: TaskState,
}

impl CpuTables {
    pub const fn new() -> Self {
        Self {
            gdt: Gdt::empty(),
            tss: TaskState::new(),
        }
    }
}

/// Tables of the boot CPU. They live in a static so the addresses handed to
/// `lgdt` and to the TSS descriptor stay valid forever.
pub static CPU0: Mutex<CpuTables> = Mutex::new(CpuTables::new());

/// Initialize and load the per-CPU TSS and IDT.
///
/// Must run after the IDT has been built and before anything can trap.
pub fn init_context(
    cpu: &dyn Cpu,
    idt: &'static GateTable,
    tables: &'static Mutex<CpuTables>,
    config: &TrapConfig,
) {
    let mut guard = tables.lock();
    let tables = &mut *guard;

    tables.gdt = Gdt::kernel();

    // the stack the CPU switches to when a ring 3 trap enters the kernel
    tables.tss.esp0 = config.kernel_stack_top;
    tables.tss.ss0 = config.kernel_data.0;
    tables.tss.iomb = core::mem::size_of::<TaskState>() as u16;

    let tss_base = &tables.tss as *const TaskState as usize as u32;
    let tss_limit = (core::mem::size_of::<TaskState>() - 1) as u32;
    tables.gdt.set(config.tss_selector, tss_segment(tss_base, tss_limit));

    let gdt_ptr = tables.gdt.pseudo_descriptor();
    let idt_ptr = idt.pseudo_descriptor();
    drop(guard);

    unsafe {
        cpu.load_gdt(&gdt_ptr, config.kernel_code, config.kernel_data);
        // like other segment selectors, the bottom three bits are special; they stay 0
        cpu.load_task_register(config.tss_selector);
        cpu.load_idt(&idt_ptr);
    }
    log::info!(
        "trap context loaded: esp0={:#010x} ss0={:#06x} tss={:#06x}",
        config.kernel_stack_top,
        config.kernel_data.0,
        config.tss_selector.0
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupts::entry::StubTable;
    use crate::interrupts::idt::build_gate_table;
    use crate::testing::{CpuCall, FakeCpu};

    fn leak_tables() -> &'static Mutex<CpuTables> {
        Box::leak(Box::new(Mutex::new(CpuTables::new())))
    }

    fn leak_idt() -> &'static GateTable {
        Box::leak(Box::new(build_gate_table(&StubTable::synthetic(0xF010_0000), GD_KT)))
    }

    #[test]
    fn flat_segments_match_reference_encodings() {
        let k = PrivilegeLevel::Ring0;
        let u = PrivilegeLevel::Ring3;
        let text = DescriptorFlags::EXECUTABLE | DescriptorFlags::READABLE;
        let data = DescriptorFlags::WRITABLE;
        assert_eq!(flat_segment(text, k), 0x00CF_9A00_0000_FFFF);
        assert_eq!(flat_segment(data, k), 0x00CF_9200_0000_FFFF);
        assert_eq!(flat_segment(text, u), 0x00CF_FA00_0000_FFFF);
        assert_eq!(flat_segment(data, u), 0x00CF_F200_0000_FFFF);
    }

    #[test]
    fn tss_descriptor_is_a_system_segment() {
        let desc = tss_segment(0xF012_3456, 103);
        assert_eq!(desc & DescriptorFlags::USER_SEGMENT.bits(), 0);
        assert_eq!(desc >> 40 & 0xF, STS_T32A);
        assert_ne!(desc & DescriptorFlags::PRESENT.bits(), 0);
        assert_eq!(desc & 0xFFFF, 103);
        assert_eq!(desc >> 16 & 0xFF_FFFF, 0x12_3456);
        assert_eq!(desc >> 56, 0xF0);
    }

    #[test]
    fn init_context_sets_privileged_stack_and_loads_tables() {
        let cpu = FakeCpu::default();
        let tables = leak_tables();
        let idt = leak_idt();
        let config = TrapConfig::default();

        init_context(&cpu, idt, tables, &config);

        let t = tables.lock();
        assert_eq!(t.tss.esp0, 0xF000_0000);
        assert_eq!(t.tss.ss0, 0x10);
        assert_eq!(t.tss.iomb, 104);
        let tss_desc = t.gdt.get(GD_TSS0);
        assert_eq!(tss_desc & DescriptorFlags::USER_SEGMENT.bits(), 0);
        assert_eq!(tss_desc >> 40 & 0xF, STS_T32A);
        assert_eq!(t.gdt.get(GD_KT), 0x00CF_9A00_0000_FFFF);

        let calls = cpu.calls();
        assert_eq!(
            calls,
            vec![
                CpuCall::LoadGdt { limit: 47, code: 0x08, data: 0x10 },
                CpuCall::LoadTaskRegister(0x28),
                CpuCall::LoadIdt { limit: 2047, base: idt.pseudo_descriptor().base },
            ]
        );
    }
}
