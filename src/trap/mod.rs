//! # Trap Dispatch
//!
//! Every trap the entry stubs catch ends up in [`TrapDispatcher::on_trap`].
//! It takes ownership of the saved frame, routes the trap and reports what
//! must happen next as a [`TrapOutcome`]. Leaving the kernel is the job of
//! the caller; on bare metal that is the `trap` symbol `_alltraps` calls.
//!
//! A trap from user space is copied into the current environment's record
//! first, so the environment resumes from exactly the state it trapped with
//! plus whatever the handlers deliberately changed.

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::Cpu;
use crate::env::{EnvId, EnvStatus, TrapServices};
use crate::interrupts::{FrameDump, TrapFrame, TrapNumber};
use crate::syscalls::dispatch_syscall;

pub mod page_fault;

#[cfg(test)]
mod tests_prop;

pub use page_fault::handle_page_fault;

/// Conditions under which the kernel cannot continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Fatal {
    #[error("unhandled trap {trapno} in kernel")]
    UnhandledKernelTrap { trapno: TrapNumber },
    #[error("kernel page fault (env {env:?}) at va {va:#010x}, ip {eip:#010x}")]
    KernelPageFault {
        env: Option<EnvId>,
        va: u32,
        eip: u32,
    },
    #[error("trap entered with interrupts enabled")]
    InterruptsEnabled,
    #[error("trap {trapno} while another trap was being dispatched")]
    NestedTrap { trapno: TrapNumber },
    #[error("no current environment")]
    NoCurrentEnv,
    #[error("env {env} is {status:?}, expected Running")]
    NotRunning {
        env: EnvId,
        status: Option<EnvStatus>,
    },
}

impl Fatal {
    /// Whether the handler that raised it has already printed the frame.
    fn frame_printed(&self) -> bool {
        matches!(self, Fatal::UnhandledKernelTrap { .. } | Fatal::KernelPageFault { .. })
    }
}

/// What the kernel does after a trap has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// Restore `frame` and return to `env`.
    Resume { env: EnvId, frame: TrapFrame },
    /// The trapped environment is gone; pick another one.
    Yield,
    /// Stop the machine.
    Halt(Fatal),
}

/// Where the frame being dispatched lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameSlot {
    /// Copied into this environment's record.
    Env(EnvId),
    /// The stack copy handed over by the entry path.
    Transient,
}

pub struct TrapDispatcher {
    busy: AtomicBool,
}

impl Default for TrapDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TrapDispatcher {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Whether a trap is being dispatched right now.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Handles one trap.
    ///
    /// Must be entered with interrupts disabled; that is asserted, never
    /// repaired. Diagnostics go to `console`.
    pub fn on_trap<S: TrapServices + ?Sized>(
        &self,
        frame: &mut TrapFrame,
        services: &mut S,
        cpu: &dyn Cpu,
        console: &mut dyn fmt::Write,
    ) -> TrapOutcome {
        // the kernel relies on DF being clear; user space may have set it
        cpu.clear_direction_flag();

        if cpu.interrupts_enabled() {
            return halt(Fatal::InterruptsEnabled, frame, cpu, console);
        }
        if self.busy.swap(true, Ordering::AcqRel) {
            let trapno = frame.trap_number();
            return halt(Fatal::NestedTrap { trapno }, frame, cpu, console);
        }

        let outcome = match self.handle(frame, services, cpu, console) {
            Ok(outcome) => outcome,
            Err(fatal) => halt(fatal, frame, cpu, console),
        };
        self.busy.store(false, Ordering::Release);
        outcome
    }

    fn handle<S: TrapServices + ?Sized>(
        &self,
        frame: &mut TrapFrame,
        services: &mut S,
        cpu: &dyn Cpu,
        console: &mut dyn fmt::Write,
    ) -> Result<TrapOutcome, Fatal> {
        log::trace!(
            "Incoming TRAP frame at {:p}: {} from ring {}",
            frame,
            frame.trap_number(),
            frame.privilege() as u8
        );

        let slot = if frame.from_user() {
            let env = services.current().ok_or(Fatal::NoCurrentEnv)?;
            let saved = services.trap_frame_mut(env).ok_or(Fatal::NotRunning {
                env,
                status: None,
            })?;
            *saved = *frame;
            FrameSlot::Env(env)
        } else {
            FrameSlot::Transient
        };

        self.dispatch(slot, frame, services, cpu, console)?;

        if let FrameSlot::Env(env) = slot {
            if !services.status(env).is_some_and(EnvStatus::is_alive) {
                return Ok(TrapOutcome::Yield);
            }
        }

        let env = services.current().ok_or(Fatal::NoCurrentEnv)?;
        match services.status(env) {
            Some(EnvStatus::Running) => {}
            status => return Err(Fatal::NotRunning { env, status }),
        }
        let frame = *services
            .trap_frame_mut(env)
            .ok_or(Fatal::NotRunning { env, status: None })?;
        Ok(TrapOutcome::Resume { env, frame })
    }

    fn dispatch<S: TrapServices + ?Sized>(
        &self,
        slot: FrameSlot,
        transient: &mut TrapFrame,
        services: &mut S,
        cpu: &dyn Cpu,
        console: &mut dyn fmt::Write,
    ) -> Result<(), Fatal> {
        let mut tf = load(slot, transient, services)?;
        let owner = match slot {
            FrameSlot::Env(env) => Some(env),
            FrameSlot::Transient => services.current(),
        };

        match tf.trap_number() {
            TrapNumber::BREAKPOINT => {
                services.enter(&mut tf);
                store(slot, transient, services, |dst| *dst = tf);
            }
            TrapNumber::PAGE_FAULT => {
                let faulting = match slot {
                    FrameSlot::Env(_) => &tf,
                    FrameSlot::Transient => &*transient,
                };
                handle_page_fault(faulting, cpu.fault_address(), owner, services, console)?;
            }
            TrapNumber::SYSCALL => {
                dispatch_syscall(&mut tf, services);
                let eax = tf.regs.eax;
                store(slot, transient, services, |dst| dst.regs.eax = eax);
            }
            trapno => {
                dump(slot, transient, services, cpu.fault_address(), console);
                if tf.from_kernel() {
                    return Err(Fatal::UnhandledKernelTrap { trapno });
                }
                let env = owner.ok_or(Fatal::NoCurrentEnv)?;
                log::warn!(
                    "destroying env {} after unhandled trap {} at ip {:#010x}",
                    env,
                    trapno,
                    tf.eip
                );
                services.destroy(env);
            }
        }
        Ok(())
    }
}

/// Every halt leaves the frame on the console; handlers that print it
/// themselves are not repeated.
fn halt(
    fatal: Fatal,
    frame: &TrapFrame,
    cpu: &dyn Cpu,
    console: &mut dyn fmt::Write,
) -> TrapOutcome {
    if !fatal.frame_printed() {
        let _ = write!(console, "{}", FrameDump::live(frame, cpu.fault_address()));
    }
    log::error!("fatal trap: {}", fatal);
    TrapOutcome::Halt(fatal)
}

/// Prints the frame where it lives: the environment's record or the entry stack.
fn dump<S: TrapServices + ?Sized>(
    slot: FrameSlot,
    transient: &TrapFrame,
    services: &mut S,
    fault_address: u32,
    console: &mut dyn fmt::Write,
) {
    let frame = match slot {
        FrameSlot::Env(env) => services.trap_frame_mut(env).map(|tf| &*tf),
        FrameSlot::Transient => Some(transient),
    };
    if let Some(frame) = frame {
        let _ = write!(console, "{}", FrameDump::live(frame, fault_address));
    }
}

fn load<S: TrapServices + ?Sized>(
    slot: FrameSlot,
    transient: &TrapFrame,
    services: &mut S,
) -> Result<TrapFrame, Fatal> {
    match slot {
        FrameSlot::Env(env) => services
            .trap_frame_mut(env)
            .map(|tf| *tf)
            .ok_or(Fatal::NotRunning { env, status: None }),
        FrameSlot::Transient => Ok(*transient),
    }
}

/// Applies `update` to the frame in `slot`, if it still exists. The
/// environment's record is reread so changes made by the handler survive.
fn store<S: TrapServices + ?Sized>(
    slot: FrameSlot,
    transient: &mut TrapFrame,
    services: &mut S,
    update: impl FnOnce(&mut TrapFrame),
) {
    match slot {
        FrameSlot::Env(env) => {
            if let Some(dst) = services.trap_frame_mut(env) {
                update(dst);
            }
        }
        FrameSlot::Transient => update(transient),
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod bare_metal {
    use spin::{Mutex, Once};

    use super::{TrapDispatcher, TrapOutcome};
    use crate::arch::X86Cpu;
    use crate::console::Console;
    use crate::env::{Scheduler, TrapServices};
    use crate::interrupts::TrapFrame;
    use crate::trap::Fatal;

    type Services = &'static Mutex<dyn TrapServices + Send>;

    static DISPATCHER: TrapDispatcher = TrapDispatcher::new();
    static KERNEL: Once<(Services, &'static dyn Scheduler)> = Once::new();

    /// Hands the trap path its collaborators. Must happen before the first
    /// environment runs; later calls are ignored.
    pub fn register_services(services: Services, scheduler: &'static dyn Scheduler) {
        KERNEL.call_once(|| (services, scheduler));
    }

    /// Called by `_alltraps` with a pointer to the frame it built.
    #[no_mangle]
    extern "C" fn trap(tf: *mut TrapFrame) -> ! {
        // SAFETY: `_alltraps` passes the frame it just pushed on this stack
        let tf = unsafe { &mut *tf };
        let Some(&(services, scheduler)) = KERNEL.get() else {
            panic!("trap {} before the trap services were registered", tf.trap_number());
        };

        let outcome = match services.try_lock() {
            Some(mut guard) => DISPATCHER.on_trap(tf, &mut *guard, &X86Cpu, &mut Console),
            None => {
                let trapno = tf.trap_number();
                super::halt(Fatal::NestedTrap { trapno }, tf, &X86Cpu, &mut Console)
            }
        };

        match outcome {
            TrapOutcome::Resume { env, .. } => scheduler.run(env),
            TrapOutcome::Yield => scheduler.yield_now(),
            TrapOutcome::Halt(fatal) => panic!("{}", fatal),
        }
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use bare_metal::register_services;
