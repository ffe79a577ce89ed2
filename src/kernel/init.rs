//! Trap subsystem bring-up phases
use spin::Mutex;

use crate::arch::Cpu;
use crate::config::{self, TrapConfig};
use crate::console;
use crate::interrupts::gdt::{self, CpuTables, CPU0};
use crate::interrupts::idt::{self, GateTable};
use crate::kernel::status::{self, ComponentTable, InitStatus};

pub const GATE_TABLE: &str = "Gate Table";
pub const TRAP_CONTEXT: &str = "Trap Context";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("gate table has not been built")]
    GateTableMissing,
    #[error("trap context is already loaded on this CPU")]
    ContextAlreadyLoaded,
    #[error("too many kernel components")]
    TooManyComponents,
}

/// Boot-order state machine for one CPU: the gate table must exist before
/// the trap context that points the CPU at it is loaded, and the context is
/// loaded once.
pub struct TrapInit<'a> {
    cpu: &'a dyn Cpu,
    tables: &'static Mutex<CpuTables>,
    config: TrapConfig,
    build_gates: fn() -> &'static GateTable,
    gates: Option<&'static GateTable>,
    status: ComponentTable,
}

impl<'a> TrapInit<'a> {
    pub fn new(
        cpu: &'a dyn Cpu,
        tables: &'static Mutex<CpuTables>,
        config: TrapConfig,
        build_gates: fn() -> &'static GateTable,
    ) -> Result<Self, InitError> {
        let mut status = ComponentTable::new();
        status.register(GATE_TABLE)?;
        status.register(TRAP_CONTEXT)?;
        Ok(Self {
            cpu,
            tables,
            config,
            build_gates,
            gates: None,
            status,
        })
    }

    pub fn status(&self) -> &ComponentTable {
        &self.status
    }

    pub fn gate_table(&mut self) -> Result<&'static GateTable, InitError> {
        let build = self.build_gates;
        let gates = init_phase(&mut self.status, GATE_TABLE, || Ok(build()))?;
        self.gates = Some(gates);
        Ok(gates)
    }

    pub fn trap_context(&mut self) -> Result<(), InitError> {
        let (cpu, tables, config, gates) = (self.cpu, self.tables, self.config, self.gates);
        let already = self.status.get(TRAP_CONTEXT) == Some(InitStatus::Completed);
        init_phase(&mut self.status, TRAP_CONTEXT, || {
            if already {
                return Err(InitError::ContextAlreadyLoaded);
            }
            let gates = gates.ok_or(InitError::GateTableMissing)?;
            gdt::init_context(cpu, gates, tables, &config);
            Ok(())
        })
    }

    /// Runs every phase in order.
    pub fn run(&mut self) -> Result<(), InitError> {
        self.gate_table()?;
        self.trap_context()
    }
}

fn init_phase<T>(
    status: &mut ComponentTable,
    name: &'static str,
    init_fn: impl FnOnce() -> Result<T, InitError>,
) -> Result<T, InitError> {
    if status.get(name) == Some(InitStatus::Completed) {
        // a finished phase keeps its status even if a rerun is refused
        return init_fn();
    }
    status.update(name, InitStatus::InProgress);
    log::info!("Initializing {}...", name);

    match init_fn() {
        Ok(value) => {
            status.update(name, InitStatus::Completed);
            log::info!("{} initialized successfully", name);
            Ok(value)
        }
        Err(e) => {
            status.update(name, InitStatus::Failed(e));
            log::error!("{} failed: {}", name, e);
            Err(e)
        }
    }
}

/// Brings up trap handling on the boot CPU.
///
/// Installs the console logger at the build-time `LOG` level first, unless
/// the kernel has already set up a logger of its own.
pub fn init_traps(cpu: &dyn Cpu) -> Result<(), InitError> {
    if console::init_logging(config::log_level()).is_err() {
        log::debug!("keeping the installed logger");
    }
    if status::component_status(TRAP_CONTEXT) == Some(InitStatus::Completed) {
        log::error!("{} failed: {}", TRAP_CONTEXT, InitError::ContextAlreadyLoaded);
        return Err(InitError::ContextAlreadyLoaded);
    }
    let mut init = TrapInit::new(cpu, &CPU0, TrapConfig::default(), idt::init_idt)?;
    let result = init.run();
    status::publish(init.status())?;
    result
}
