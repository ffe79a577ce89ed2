//! # Interrupt Descriptor Table
//!
//! Built exactly once at boot from the entry [`StubTable`], then loaded by
//! [`gdt::init_context`](crate::interrupts::gdt::init_context). Nothing may
//! trap before the table is loaded, and the table never changes afterwards.
//!
//! Every gate is a 32-bit interrupt gate, so the CPU clears `IF` on entry and
//! the dispatcher always runs with interrupts disabled.

use spin::Once;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

use crate::arch::PseudoDescriptor;
use crate::config::GD_KT;
use crate::interrupts::entry::{self, EntryStub, StubTable};
use crate::interrupts::vectors::TrapNumber;

pub const IDT_ENTRIES: usize = 256;

static IDT: Once<GateTable> = Once::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GateKind {
    /// 32-bit interrupt gate; clears `IF` on entry.
    Interrupt32 = 0xE,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDescriptor {
    pub stub: EntryStub,
    pub selector: SegmentSelector,
    /// Lowest privilege allowed to raise this vector with `int`.
    pub dpl: PrivilegeLevel,
    pub kind: GateKind,
}

impl GateDescriptor {
    const PRESENT: u64 = 1 << 47;

    pub fn new(stub: EntryStub, selector: SegmentSelector, dpl: PrivilegeLevel) -> Self {
        Self {
            stub,
            selector,
            dpl,
            kind: GateKind::Interrupt32,
        }
    }

    /// Hardware layout: offset 15..0, selector, reserved byte,
    /// type/S/DPL/P, offset 31..16.
    pub fn encode(&self) -> u64 {
        let offset = u64::from(self.stub.addr());
        let mut raw = offset & 0xFFFF;
        raw |= u64::from(self.selector.0) << 16;
        raw |= (self.kind as u64) << 40;
        raw |= (self.dpl as u64) << 45;
        raw |= Self::PRESENT;
        raw |= (offset >> 16) << 48;
        raw
    }
}

/// The encoded table handed to `lidt`.
#[repr(C, align(8))]
pub struct RawIdt([u64; IDT_ENTRIES]);

pub struct GateTable {
    gates: [Option<GateDescriptor>; IDT_ENTRIES],
    raw: RawIdt,
}

impl GateTable {
    const fn empty() -> Self {
        Self {
            gates: [None; IDT_ENTRIES],
            raw: RawIdt([0; IDT_ENTRIES]),
        }
    }

    fn set(&mut self, trapno: TrapNumber, gate: GateDescriptor) {
        self.gates[trapno.as_usize()] = Some(gate);
        self.raw.0[trapno.as_usize()] = gate.encode();
    }

    pub fn gate(&self, trapno: TrapNumber) -> Option<&GateDescriptor> {
        self.gates.get(trapno.as_usize())?.as_ref()
    }

    pub fn present(&self) -> impl Iterator<Item = (TrapNumber, &GateDescriptor)> + '_ {
        self.gates
            .iter()
            .enumerate()
            .filter_map(|(n, g)| g.as_ref().map(|g| (TrapNumber(n as u32), g)))
    }

    pub fn raw(&self) -> &[u64; IDT_ENTRIES] {
        &self.raw.0
    }

    pub fn pseudo_descriptor(&'static self) -> PseudoDescriptor {
        PseudoDescriptor {
            limit: (core::mem::size_of::<RawIdt>() - 1) as u16,
            base: &self.raw as *const RawIdt as usize,
        }
    }
}

/// dpl = 0 -> kernel ring, reachable only through hardware fault delivery.
/// dpl = 3 -> user ring, reachable with `int3` / `int $0x30`.
pub fn build_gate_table(stubs: &StubTable, code: SegmentSelector) -> GateTable {
    let mut idt = GateTable::empty();
    for (trapno, stub) in stubs.iter() {
        let dpl = if trapno.user_invocable() {
            PrivilegeLevel::Ring3
        } else {
            PrivilegeLevel::Ring0
        };
        idt.set(trapno, GateDescriptor::new(stub, code, dpl));
    }
    idt
}

/// Builds the kernel IDT on first call; later calls return the same table.
pub fn init_idt() -> &'static GateTable {
    IDT.call_once(|| build_gate_table(&entry::stub_table(), GD_KT))
}

/// The kernel IDT, if it has been built.
pub fn idt() -> Option<&'static GateTable> {
    IDT.get()
}
