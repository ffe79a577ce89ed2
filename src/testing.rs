//! Fakes shared by the unit tests.

use core::cell::{Cell, RefCell};

use x86_64::registers::rflags::RFlags;
use x86_64::structures::gdt::SegmentSelector;

use crate::arch::{Cpu, PseudoDescriptor};
use crate::env::{EnvId, EnvStatus, Environments, Monitor};
use crate::interrupts::{TrapFrame, TrapNumber};
use crate::syscalls::Syscalls;

/// Frame as the entry path builds it for a trap out of ring 3.
pub fn user_frame(trapno: TrapNumber) -> TrapFrame {
    TrapFrame {
        es: 0x23,
        ds: 0x23,
        trapno: trapno.as_u32(),
        eip: 0x0080_0020,
        cs: 0x1b,
        eflags: 0x202,
        esp: 0xeebf_dfd0,
        ss: 0x23,
        ..TrapFrame::default()
    }
}

/// Frame for a trap taken while already in ring 0; no stack switch happened.
pub fn kernel_frame(trapno: TrapNumber) -> TrapFrame {
    TrapFrame {
        es: 0x10,
        ds: 0x10,
        trapno: trapno.as_u32(),
        eip: 0xf010_0a3c,
        cs: 0x08,
        eflags: 0x86,
        ..TrapFrame::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuCall {
    LoadGdt { limit: u16, code: u16, data: u16 },
    LoadTaskRegister(u16),
    LoadIdt { limit: u16, base: usize },
}

#[derive(Debug, Default)]
pub struct FakeCpu {
    fault_address: u32,
    interrupts: bool,
    direction_cleared: Cell<bool>,
    calls: RefCell<Vec<CpuCall>>,
}

impl FakeCpu {
    pub fn with_fault_address(va: u32) -> Self {
        Self {
            fault_address: va,
            ..Self::default()
        }
    }

    pub fn with_interrupts(mut self) -> Self {
        self.interrupts = true;
        self
    }

    pub fn direction_cleared(&self) -> bool {
        self.direction_cleared.get()
    }

    pub fn calls(&self) -> Vec<CpuCall> {
        self.calls.borrow().clone()
    }
}

impl Cpu for FakeCpu {
    fn fault_address(&self) -> u32 {
        self.fault_address
    }

    fn flags(&self) -> RFlags {
        let mut flags = RFlags::from_bits_truncate(0x2);
        flags.set(RFlags::INTERRUPT_FLAG, self.interrupts);
        flags
    }

    fn clear_direction_flag(&self) {
        self.direction_cleared.set(true);
    }

    unsafe fn load_gdt(
        &self,
        gdt: &PseudoDescriptor,
        code: SegmentSelector,
        data: SegmentSelector,
    ) {
        self.calls.borrow_mut().push(CpuCall::LoadGdt {
            limit: { gdt.limit },
            code: code.0,
            data: data.0,
        });
    }

    unsafe fn load_task_register(&self, selector: SegmentSelector) {
        self.calls
            .borrow_mut()
            .push(CpuCall::LoadTaskRegister(selector.0));
    }

    unsafe fn load_idt(&self, idt: &PseudoDescriptor) {
        self.calls.borrow_mut().push(CpuCall::LoadIdt {
            limit: { idt.limit },
            base: { idt.base },
        });
    }
}

/// Environment table holding a handful of records.
#[derive(Debug, Default)]
pub struct FakeEnvs {
    current: Option<EnvId>,
    records: Vec<(EnvId, EnvStatus, TrapFrame)>,
    pub destroyed: Vec<EnvId>,
}

impl FakeEnvs {
    /// One environment, currently on the CPU.
    pub fn running(env: EnvId) -> Self {
        Self {
            current: Some(env),
            records: vec![(env, EnvStatus::Running, TrapFrame::default())],
            destroyed: Vec::new(),
        }
    }

    pub fn frame(&self, env: EnvId) -> Option<TrapFrame> {
        self.records
            .iter()
            .find(|(id, ..)| *id == env)
            .map(|(_, _, tf)| *tf)
    }

    pub fn set_status(&mut self, env: EnvId, status: EnvStatus) {
        if let Some(record) = self.records.iter_mut().find(|(id, ..)| *id == env) {
            record.1 = status;
        }
    }
}

impl Environments for FakeEnvs {
    fn current(&self) -> Option<EnvId> {
        self.current
    }

    fn status(&self, env: EnvId) -> Option<EnvStatus> {
        self.records
            .iter()
            .find(|(id, ..)| *id == env)
            .map(|(_, status, _)| *status)
    }

    fn trap_frame_mut(&mut self, env: EnvId) -> Option<&mut TrapFrame> {
        self.records
            .iter_mut()
            .find(|(id, ..)| *id == env)
            .map(|(_, _, tf)| tf)
    }

    fn destroy(&mut self, env: EnvId) {
        self.records.retain(|(id, ..)| *id != env);
        if self.current == Some(env) {
            self.current = None;
        }
        self.destroyed.push(env);
    }
}

/// Records every call and answers with a fixed value.
#[derive(Debug, Default)]
pub struct RecordingSyscalls {
    pub result: i32,
    pub calls: Vec<(u32, [u32; 5])>,
    /// Makes the call rewrite the caller's saved `eip`, like a self-targeted
    /// "set trap frame" call would.
    pub rewrite_eip: Option<(EnvId, u32)>,
    /// Makes the call destroy its caller, like an exit call would.
    pub destroy_caller: bool,
}

impl RecordingSyscalls {
    pub fn returning(result: i32) -> Self {
        Self {
            result,
            ..Self::default()
        }
    }
}

impl Syscalls for RecordingSyscalls {
    fn invoke(&mut self, number: u32, a1: u32, a2: u32, a3: u32, a4: u32, a5: u32) -> i32 {
        self.calls.push((number, [a1, a2, a3, a4, a5]));
        self.result
    }
}

#[derive(Debug, Default)]
pub struct FakeMonitor {
    pub entered: usize,
    /// Single-step the trapped code on return.
    pub set_trap_flag: bool,
}

impl Monitor for FakeMonitor {
    fn enter(&mut self, frame: &mut TrapFrame) {
        self.entered += 1;
        if self.set_trap_flag {
            frame.eflags |= 0x100;
        }
    }
}

/// Every trap collaborator in one place.
#[derive(Debug, Default)]
pub struct FakeKernel {
    pub envs: FakeEnvs,
    pub syscalls: RecordingSyscalls,
    pub monitor: FakeMonitor,
}

impl FakeKernel {
    pub fn running(env: EnvId) -> Self {
        Self {
            envs: FakeEnvs::running(env),
            ..Self::default()
        }
    }

    pub fn with_syscall_result(mut self, result: i32) -> Self {
        self.syscalls.result = result;
        self
    }
}

impl Environments for FakeKernel {
    fn current(&self) -> Option<EnvId> {
        self.envs.current()
    }

    fn status(&self, env: EnvId) -> Option<EnvStatus> {
        self.envs.status(env)
    }

    fn trap_frame_mut(&mut self, env: EnvId) -> Option<&mut TrapFrame> {
        self.envs.trap_frame_mut(env)
    }

    fn destroy(&mut self, env: EnvId) {
        self.envs.destroy(env)
    }
}

impl Syscalls for FakeKernel {
    fn invoke(&mut self, number: u32, a1: u32, a2: u32, a3: u32, a4: u32, a5: u32) -> i32 {
        let ret = self.syscalls.invoke(number, a1, a2, a3, a4, a5);
        if let Some((env, eip)) = self.syscalls.rewrite_eip {
            if let Some(tf) = self.envs.trap_frame_mut(env) {
                tf.eip = eip;
            }
        }
        if self.syscalls.destroy_caller {
            if let Some(env) = self.envs.current() {
                self.envs.destroy(env);
            }
        }
        ret
    }
}

impl Monitor for FakeKernel {
    fn enter(&mut self, frame: &mut TrapFrame) {
        self.monitor.enter(frame)
    }
}
