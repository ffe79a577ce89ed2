use crate::interrupts::TrapFrame;

/// System call result type
pub type SyscallResult = Result<u32, SyscallError>;

/// System call errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SyscallError {
    #[error("unspecified error")]
    Unspecified,
    #[error("bad environment")]
    BadEnv,
    #[error("invalid parameter")]
    Invalid,
    #[error("out of memory")]
    NoMemory,
    #[error("out of environments")]
    NoFreeEnv,
    #[error("segmentation fault")]
    Fault,
}

impl SyscallError {
    pub fn as_errno(self) -> i32 {
        match self {
            Self::Unspecified => -1,
            Self::BadEnv => -2,
            Self::Invalid => -3,
            Self::NoMemory => -4,
            Self::NoFreeEnv => -5,
            Self::Fault => -6,
        }
    }
}

/// Packs a typed result into the value user space finds in `eax`.
pub fn encode_result(result: SyscallResult) -> i32 {
    match result {
        Ok(value) => value as i32,
        Err(err) => err.as_errno(),
    }
}

/// The kernel's system call table.
pub trait Syscalls {
    /// Runs system call `number`. Arguments arrive unvalidated; a negative
    /// return is an error code.
    fn invoke(&mut self, number: u32, a1: u32, a2: u32, a3: u32, a4: u32, a5: u32) -> i32;
}

/// System call context - the number and five argument words from the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallContext {
    pub syscall_num: u32,
    pub args: [u32; 5],
}

impl SyscallContext {
    /// i386 `int $0x30` convention:
    ///   eax = syscall number
    ///   edx = a1
    ///   ecx = a2
    ///   ebx = a3
    ///   edi = a4
    ///   esi = a5
    pub fn from_frame(frame: &TrapFrame) -> Self {
        let r = &frame.regs;
        Self {
            syscall_num: r.eax,
            args: [r.edx, r.ecx, r.ebx, r.edi, r.esi],
        }
    }

    pub fn invoke<S: Syscalls + ?Sized>(&self, syscalls: &mut S) -> i32 {
        let [a1, a2, a3, a4, a5] = self.args;
        syscalls.invoke(self.syscall_num, a1, a2, a3, a4, a5)
    }
}

/// Runs the system call described by `frame` and stores its result in `eax`.
/// No other part of the frame is touched.
pub fn dispatch_syscall<S: Syscalls + ?Sized>(frame: &mut TrapFrame, syscalls: &mut S) {
    let ctx = SyscallContext::from_frame(frame);
    log::debug!(
        "SYSCALL: {}({:#x}, {:#x}, {:#x}, {:#x}, {:#x})",
        ctx.syscall_num,
        ctx.args[0],
        ctx.args[1],
        ctx.args[2],
        ctx.args[3],
        ctx.args[4]
    );
    let ret = ctx.invoke(syscalls);
    frame.regs.eax = ret as u32;
}
