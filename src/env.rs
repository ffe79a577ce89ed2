//! Services the trap core borrows from the rest of the kernel.
//!
//! The trap path never owns environments, the scheduler, the debugger or the
//! system call table; it reaches them only through these traits so it can be
//! driven against fakes.

use core::fmt;

use crate::interrupts::TrapFrame;
use crate::syscalls::Syscalls;

/// Environment (process) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvId(pub u32);

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvStatus {
    Free,
    Dying,
    Runnable,
    Running,
    NotRunnable,
}

impl EnvStatus {
    /// Whether the record still belongs to a live environment.
    pub fn is_alive(self) -> bool {
        !matches!(self, EnvStatus::Free | EnvStatus::Dying)
    }
}

/// The environment table as seen from the trap path.
pub trait Environments {
    /// Environment currently owning the CPU.
    fn current(&self) -> Option<EnvId>;

    /// `None` once the id no longer names an environment.
    fn status(&self, env: EnvId) -> Option<EnvStatus>;

    /// Saved register slot of `env`; resuming the environment reloads it.
    fn trap_frame_mut(&mut self, env: EnvId) -> Option<&mut TrapFrame>;

    /// Tears the environment down. Must not switch away from the kernel stack.
    fn destroy(&mut self, env: EnvId);
}

/// Kernel debugger entered on `int3`.
pub trait Monitor {
    /// May inspect and modify the frame; returning resumes the trapped code.
    fn enter(&mut self, frame: &mut TrapFrame);
}

/// Everything [`TrapDispatcher`](crate::trap::TrapDispatcher) calls out to.
pub trait TrapServices: Environments + Syscalls + Monitor {}

impl<T: Environments + Syscalls + Monitor> TrapServices for T {}

/// Leaves the trap path for good: either restore a saved frame or pick
/// another environment.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub trait Scheduler: Sync {
    fn run(&self, env: EnvId) -> !;

    fn yield_now(&self) -> !;
}
