//! System call bridge: the `int $0x30` frame on one side, the kernel's
//! system call table on the other.

pub mod dispatcher;

pub use dispatcher::{
    dispatch_syscall, encode_result, SyscallContext, SyscallError, SyscallResult, Syscalls,
};
