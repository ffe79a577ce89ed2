//! Page fault policy. There is no demand paging: a fault in the kernel is a
//! bug, a fault in user space ends the environment.

use core::fmt::{self, Write};

use crate::env::{EnvId, Environments};
use crate::interrupts::{FrameDump, TrapFrame};
use crate::trap::Fatal;

/// Handles a page fault at `fault_va` taken by `env`.
///
/// Diagnostics go to `console` before any action; an error return means the
/// kernel must halt. A user frame is printed from the environment's record,
/// which the trap path has already filled in.
pub fn handle_page_fault<E: Environments + ?Sized>(
    frame: &TrapFrame,
    fault_va: u32,
    env: Option<EnvId>,
    envs: &mut E,
    console: &mut dyn fmt::Write,
) -> Result<(), Fatal> {
    if frame.from_kernel() {
        let _ = write!(console, "{}", FrameDump::live(frame, fault_va));
        return Err(Fatal::KernelPageFault {
            env,
            va: fault_va,
            eip: frame.eip,
        });
    }

    let env = env.ok_or(Fatal::NoCurrentEnv)?;
    let _ = writeln!(
        console,
        "[{}] user fault va {:08x} ip {:08x}",
        env, fault_va, frame.eip
    );
    let saved = envs.trap_frame_mut(env).map(|tf| &*tf).unwrap_or(frame);
    let _ = write!(console, "{}", FrameDump::live(saved, fault_va));
    log::warn!(
        "destroying env {} after page fault at va {:#010x}, ip {:#010x}",
        env,
        fault_va,
        frame.eip
    );
    envs.destroy(env);
    Ok(())
}
