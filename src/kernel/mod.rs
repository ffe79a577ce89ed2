/// Kernel initialization and bootstrap module
pub mod init;
pub mod status;

pub use init::{init_traps, InitError, TrapInit};
pub use status::{component_status, InitStatus};
