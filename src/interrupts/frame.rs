//! # Saved Trap Frame
//!
//! The record the entry stubs build on the kernel stack. The layout is shared
//! with `_alltraps` and with the environment resume path, so field order and
//! size must not change.
//!
//! ```text
//!  high   ss, esp        pushed by the CPU on a ring 3 -> ring 0 transfer
//!         eflags, cs, eip
//!         err            CPU or stub (zero)
//!         trapno         stub
//!         ds, es         _alltraps
//!  low    pushal block   _alltraps
//! ```

use core::fmt;

use static_assertions::const_assert_eq;
use x86_64::registers::rflags::RFlags;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::structures::idt::PageFaultErrorCode;
use x86_64::PrivilegeLevel;

use crate::interrupts::vectors::TrapNumber;

/// General-purpose registers in `pushal` order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushRegs {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// Useless `esp` value pushed by `pushal`.
    pub oesp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub regs: PushRegs,
    pub es: u16,
    pub padding1: u16,
    pub ds: u16,
    pub padding2: u16,
    pub trapno: u32,
    // below here defined by x86 hardware
    pub err: u32,
    pub eip: u32,
    pub cs: u16,
    pub padding3: u16,
    pub eflags: u32,
    // below here only when crossing rings
    pub esp: u32,
    pub ss: u16,
    pub padding4: u16,
}

const_assert_eq!(core::mem::size_of::<PushRegs>(), 32);
const_assert_eq!(core::mem::size_of::<TrapFrame>(), 68);

impl TrapFrame {
    pub fn trap_number(&self) -> TrapNumber {
        TrapNumber(self.trapno)
    }

    pub fn code_selector(&self) -> SegmentSelector {
        SegmentSelector(self.cs)
    }

    /// Privilege the interrupted code was running at.
    pub fn privilege(&self) -> PrivilegeLevel {
        self.code_selector().rpl()
    }

    pub fn from_kernel(&self) -> bool {
        self.privilege() == PrivilegeLevel::Ring0
    }

    pub fn from_user(&self) -> bool {
        self.privilege() == PrivilegeLevel::Ring3
    }

    pub fn flags(&self) -> RFlags {
        RFlags::from_bits_truncate(u64::from(self.eflags))
    }

    pub fn page_fault_code(&self) -> PageFaultErrorCode {
        PageFaultErrorCode::from_bits_truncate(u64::from(self.err))
    }
}

impl fmt::Display for PushRegs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  edi  0x{:08x}", self.edi)?;
        writeln!(f, "  esi  0x{:08x}", self.esi)?;
        writeln!(f, "  ebp  0x{:08x}", self.ebp)?;
        writeln!(f, "  oesp 0x{:08x}", self.oesp)?;
        writeln!(f, "  ebx  0x{:08x}", self.ebx)?;
        writeln!(f, "  edx  0x{:08x}", self.edx)?;
        writeln!(f, "  ecx  0x{:08x}", self.ecx)?;
        writeln!(f, "  eax  0x{:08x}", self.eax)
    }
}

/// Diagnostic dump of a trap frame.
///
/// `cr2` is only shown for the frame currently being handled: a saved frame
/// printed later has no relation to whatever the fault address register holds
/// by then. Use [`FrameDump::live`] for the former and [`FrameDump::saved`]
/// for the latter.
pub struct FrameDump<'a> {
    frame: &'a TrapFrame,
    fault_address: Option<u32>,
}

impl<'a> FrameDump<'a> {
    pub fn saved(frame: &'a TrapFrame) -> Self {
        Self {
            frame,
            fault_address: None,
        }
    }

    pub fn live(frame: &'a TrapFrame, fault_address: u32) -> Self {
        Self {
            frame,
            fault_address: Some(fault_address),
        }
    }
}

impl fmt::Display for FrameDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tf = self.frame;
        let is_page_fault = tf.trap_number() == TrapNumber::PAGE_FAULT;

        writeln!(f, "TRAP frame at {:p}", tf)?;
        write!(f, "{}", tf.regs)?;
        writeln!(f, "  es   0x----{:04x}", tf.es)?;
        writeln!(f, "  ds   0x----{:04x}", tf.ds)?;
        writeln!(f, "  trap 0x{:08x} {}", tf.trapno, tf.trap_number().name())?;
        if let (true, Some(cr2)) = (is_page_fault, self.fault_address) {
            writeln!(f, "  cr2  0x{:08x}", cr2)?;
        }
        write!(f, "  err  0x{:08x}", tf.err)?;
        if is_page_fault {
            let code = tf.page_fault_code();
            write!(
                f,
                " [{}, {}, {}]",
                if code.contains(PageFaultErrorCode::USER_MODE) { "user" } else { "kernel" },
                if code.contains(PageFaultErrorCode::CAUSED_BY_WRITE) { "write" } else { "read" },
                if code.contains(PageFaultErrorCode::PROTECTION_VIOLATION) {
                    "protection"
                } else {
                    "not-present"
                },
            )?;
        }
        writeln!(f)?;
        writeln!(f, "  eip  0x{:08x}", tf.eip)?;
        writeln!(f, "  cs   0x----{:04x}", tf.cs)?;
        writeln!(f, "  flag 0x{:08x}", tf.eflags)?;
        if !tf.from_kernel() {
            writeln!(f, "  esp  0x{:08x}", tf.esp)?;
            writeln!(f, "  ss   0x----{:04x}", tf.ss)?;
        }
        Ok(())
    }
}
