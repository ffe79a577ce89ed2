//! # Low-Level Entry Stubs
//!
//! One stub per vectored trap number. Each stub pushes a zero error code when
//! the CPU does not supply one, pushes its vector number and jumps to
//! `_alltraps`, which completes the [`TrapFrame`] and calls `trap`.
//!
//! The dispatch core only ever sees stubs through a [`StubTable`]: on the
//! bare-metal target the entries are the assembled `trap_N` symbols, on the
//! host they are synthetic tags so the gate table can be built and checked
//! without a CPU.
//!
//! [`TrapFrame`]: crate::interrupts::frame::TrapFrame

use crate::interrupts::vectors::TrapNumber;

/// Opaque handle of an entry stub: the linear address the gate points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryStub(u32);

impl EntryStub {
    pub const fn from_addr(addr: u32) -> Self {
        Self(addr)
    }

    pub const fn addr(self) -> u32 {
        self.0
    }
}

/// Maps every vectored trap number to its entry stub.
#[derive(Debug, Clone)]
pub struct StubTable {
    stubs: [(TrapNumber, EntryStub); TrapNumber::VECTOR_COUNT],
}

impl StubTable {
    pub fn new(stubs: [(TrapNumber, EntryStub); TrapNumber::VECTOR_COUNT]) -> Self {
        Self { stubs }
    }

    /// Synthetic stubs at `base + 16 * vector`, for hosts without the assembled entry code.
    pub fn synthetic(base: u32) -> Self {
        Self::new(TrapNumber::VECTORED.map(|t| (t, EntryStub::from_addr(base + 16 * t.as_u32()))))
    }

    pub fn get(&self, trapno: TrapNumber) -> Option<EntryStub> {
        self.stubs.iter().find(|(t, _)| *t == trapno).map(|(_, stub)| *stub)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TrapNumber, EntryStub)> + '_ {
        self.stubs.iter().copied()
    }
}

/// Stubs of the running kernel.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn stub_table() -> StubTable {
    use bare_metal::*;

    let entry = |f: unsafe extern "C" fn()| EntryStub::from_addr(f as usize as u32);
    StubTable::new([
        (TrapNumber::DIVIDE, entry(trap_0)),
        (TrapNumber::DEBUG, entry(trap_1)),
        (TrapNumber::NMI, entry(trap_2)),
        (TrapNumber::BREAKPOINT, entry(trap_3)),
        (TrapNumber::OVERFLOW, entry(trap_4)),
        (TrapNumber::BOUND, entry(trap_5)),
        (TrapNumber::ILLEGAL_OPCODE, entry(trap_6)),
        (TrapNumber::DEVICE, entry(trap_7)),
        (TrapNumber::DOUBLE_FAULT, entry(trap_8)),
        (TrapNumber::INVALID_TSS, entry(trap_10)),
        (TrapNumber::SEGMENT_NOT_PRESENT, entry(trap_11)),
        (TrapNumber::STACK, entry(trap_12)),
        (TrapNumber::GENERAL_PROTECTION, entry(trap_13)),
        (TrapNumber::PAGE_FAULT, entry(trap_14)),
        (TrapNumber::FP_ERROR, entry(trap_16)),
        (TrapNumber::ALIGNMENT, entry(trap_17)),
        (TrapNumber::MACHINE_CHECK, entry(trap_18)),
        (TrapNumber::SIMD_ERROR, entry(trap_19)),
        (TrapNumber::SYSCALL, entry(trap_48)),
    ])
}

/// Stubs of the running kernel.
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn stub_table() -> StubTable {
    StubTable::synthetic(0xF010_0000)
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod bare_metal {
    core::arch::global_asm!(
        r#"
        .macro TRAPHANDLER name, num
            .globl \name
            .type \name, @function
            .align 2
        \name:
            pushl $\num
            jmp _alltraps
        .endm

        .macro TRAPHANDLER_NOEC name, num
            .globl \name
            .type \name, @function
            .align 2
        \name:
            pushl $0
            pushl $\num
            jmp _alltraps
        .endm

        .text
        TRAPHANDLER_NOEC trap_0, 0
        TRAPHANDLER_NOEC trap_1, 1
        TRAPHANDLER_NOEC trap_2, 2
        TRAPHANDLER_NOEC trap_3, 3
        TRAPHANDLER_NOEC trap_4, 4
        TRAPHANDLER_NOEC trap_5, 5
        TRAPHANDLER_NOEC trap_6, 6
        TRAPHANDLER_NOEC trap_7, 7
        TRAPHANDLER      trap_8, 8
        TRAPHANDLER      trap_10, 10
        TRAPHANDLER      trap_11, 11
        TRAPHANDLER      trap_12, 12
        TRAPHANDLER      trap_13, 13
        TRAPHANDLER      trap_14, 14
        TRAPHANDLER_NOEC trap_16, 16
        TRAPHANDLER      trap_17, 17
        TRAPHANDLER_NOEC trap_18, 18
        TRAPHANDLER_NOEC trap_19, 19
        TRAPHANDLER_NOEC trap_48, 48

        _alltraps:
            pushl %ds
            pushl %es
            pushal
            movw ${kd}, %ax
            movw %ax, %ds
            movw %ax, %es
            pushl %esp
            call trap
        "#,
        kd = const crate::config::GD_KD.0,
        options(att_syntax)
    );

    extern "C" {
        pub fn trap_0();
        pub fn trap_1();
        pub fn trap_2();
        pub fn trap_3();
        pub fn trap_4();
        pub fn trap_5();
        pub fn trap_6();
        pub fn trap_7();
        pub fn trap_8();
        pub fn trap_10();
        pub fn trap_11();
        pub fn trap_12();
        pub fn trap_13();
        pub fn trap_14();
        pub fn trap_16();
        pub fn trap_17();
        pub fn trap_18();
        pub fn trap_19();
        pub fn trap_48();
    }
}
