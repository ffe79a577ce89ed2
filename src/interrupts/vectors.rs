//! # Trap Vector Numbers and Exception Catalog
//!
//! | Vector | Mnemonic | Error code | Gate DPL |
//! |--------|----------|------------|----------|
//! | 0      | #DE      | no         | 0        |
//! | 1      | #DB      | no         | 0        |
//! | 2      | NMI      | no         | 0        |
//! | 3      | #BP      | no         | 3        |
//! | 4      | #OF      | no         | 0        |
//! | 5      | #BR      | no         | 0        |
//! | 6      | #UD      | no         | 0        |
//! | 7      | #NM      | no         | 0        |
//! | 8      | #DF      | yes        | 0        |
//! | 10     | #TS      | yes        | 0        |
//! | 11     | #NP      | yes        | 0        |
//! | 12     | #SS      | yes        | 0        |
//! | 13     | #GP      | yes        | 0        |
//! | 14     | #PF      | yes        | 0        |
//! | 16     | #MF      | no         | 0        |
//! | 17     | #AC      | yes        | 0        |
//! | 18     | #MC      | no         | 0        |
//! | 19     | #XM      | no         | 0        |
//! | 48     | syscall  | no         | 3        |
//!
//! Vectors 9 and 15 are reserved by the CPU and never get a gate.

use core::fmt;

use crate::config::T_SYSCALL;

/// Identifies why control was transferred into the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TrapNumber(pub u32);

impl TrapNumber {
    pub const DIVIDE: Self = Self(0);
    pub const DEBUG: Self = Self(1);
    pub const NMI: Self = Self(2);
    pub const BREAKPOINT: Self = Self(3);
    pub const OVERFLOW: Self = Self(4);
    pub const BOUND: Self = Self(5);
    pub const ILLEGAL_OPCODE: Self = Self(6);
    pub const DEVICE: Self = Self(7);
    pub const DOUBLE_FAULT: Self = Self(8);
    pub const INVALID_TSS: Self = Self(10);
    pub const SEGMENT_NOT_PRESENT: Self = Self(11);
    pub const STACK: Self = Self(12);
    pub const GENERAL_PROTECTION: Self = Self(13);
    pub const PAGE_FAULT: Self = Self(14);
    pub const FP_ERROR: Self = Self(16);
    pub const ALIGNMENT: Self = Self(17);
    pub const MACHINE_CHECK: Self = Self(18);
    pub const SIMD_ERROR: Self = Self(19);
    pub const SYSCALL: Self = Self(T_SYSCALL);

    pub const VECTOR_COUNT: usize = 19;

    /// Every vector that gets a gate and an entry stub.
    pub const VECTORED: [TrapNumber; Self::VECTOR_COUNT] = [
        Self::DIVIDE,
        Self::DEBUG,
        Self::NMI,
        Self::BREAKPOINT,
        Self::OVERFLOW,
        Self::BOUND,
        Self::ILLEGAL_OPCODE,
        Self::DEVICE,
        Self::DOUBLE_FAULT,
        Self::INVALID_TSS,
        Self::SEGMENT_NOT_PRESENT,
        Self::STACK,
        Self::GENERAL_PROTECTION,
        Self::PAGE_FAULT,
        Self::FP_ERROR,
        Self::ALIGNMENT,
        Self::MACHINE_CHECK,
        Self::SIMD_ERROR,
        Self::SYSCALL,
    ];

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Human-readable name, "(unknown trap)" for anything outside the catalog.
    pub fn name(self) -> &'static str {
        trap_name(self.0)
    }

    /// Whether the CPU itself pushes an error code for this vector.
    /// The entry stub pushes a zero for every other vector so frames stay uniform.
    pub const fn pushes_error_code(self) -> bool {
        matches!(self.0, 8 | 10 | 11 | 12 | 13 | 14 | 17)
    }

    /// Only these may be raised deliberately from ring 3 (`int3`, `int $0x30`).
    pub const fn user_invocable(self) -> bool {
        self.0 == Self::BREAKPOINT.0 || self.0 == Self::SYSCALL.0
    }
}

impl From<u32> for TrapNumber {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TrapNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

const EXCEPTION_NAMES: [&str; 20] = [
    "Divide error",
    "Debug",
    "Non-Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "BOUND Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack Fault",
    "General Protection",
    "Page Fault",
    "(unknown trap)",
    "x87 FPU Floating-Point Error",
    "Alignment Check",
    "Machine-Check",
    "SIMD Floating-Point Exception",
];

pub fn trap_name(trapno: u32) -> &'static str {
    if let Some(name) = EXCEPTION_NAMES.get(trapno as usize) {
        return name;
    }
    if trapno == T_SYSCALL {
        return "System call";
    }
    "(unknown trap)"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_match_hardware_vectors() {
        assert_eq!(trap_name(0), "Divide error");
        assert_eq!(trap_name(3), "Breakpoint");
        assert_eq!(trap_name(13), "General Protection");
        assert_eq!(trap_name(14), "Page Fault");
        assert_eq!(trap_name(19), "SIMD Floating-Point Exception");
        assert_eq!(trap_name(48), "System call");
    }

    #[test]
    fn reserved_and_out_of_range_fall_back_to_unknown() {
        assert_eq!(trap_name(15), "(unknown trap)");
        assert_eq!(trap_name(20), "(unknown trap)");
        assert_eq!(trap_name(47), "(unknown trap)");
        assert_eq!(trap_name(u32::MAX), "(unknown trap)");
    }

    #[test]
    fn vectored_set_is_unique_and_named() {
        for (i, a) in TrapNumber::VECTORED.iter().enumerate() {
            assert_ne!(a.name(), "(unknown trap)", "vector {}", a.0);
            for b in &TrapNumber::VECTORED[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(!TrapNumber::VECTORED.contains(&TrapNumber(9)));
        assert!(!TrapNumber::VECTORED.contains(&TrapNumber(15)));
    }

    #[test]
    fn only_breakpoint_and_syscall_are_user_invocable() {
        let user: Vec<_> = TrapNumber::VECTORED
            .iter()
            .filter(|t| t.user_invocable())
            .copied()
            .collect();
        assert_eq!(user, [TrapNumber::BREAKPOINT, TrapNumber::SYSCALL]);
    }

    #[test]
    fn error_code_vectors() {
        assert!(TrapNumber::PAGE_FAULT.pushes_error_code());
        assert!(TrapNumber::DOUBLE_FAULT.pushes_error_code());
        assert!(!TrapNumber::BREAKPOINT.pushes_error_code());
        assert!(!TrapNumber::SYSCALL.pushes_error_code());
    }
}
