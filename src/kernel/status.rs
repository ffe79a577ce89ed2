use core::fmt;
use spin::Mutex;

use crate::kernel::init::InitError;

/// Upper bound on tracked components; the table lives in static storage.
pub const MAX_COMPONENTS: usize = 8;

/// Kernel initialization status tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed(InitError),
}

/// Kernel component status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStatus {
    pub name: &'static str,
    pub status: InitStatus,
}

impl ComponentStatus {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            status: InitStatus::NotStarted,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, InitStatus::Completed)
    }
}

/// Components in registration order.
#[derive(Debug, Clone, Copy)]
pub struct ComponentTable {
    entries: [Option<ComponentStatus>; MAX_COMPONENTS],
}

impl Default for ComponentTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentTable {
    pub const fn new() -> Self {
        Self {
            entries: [None; MAX_COMPONENTS],
        }
    }

    /// Registering a name twice is a no-op.
    pub fn register(&mut self, name: &'static str) -> Result<(), InitError> {
        if self.get(name).is_some() {
            return Ok(());
        }
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.is_none())
            .ok_or(InitError::TooManyComponents)?;
        *slot = Some(ComponentStatus::new(name));
        Ok(())
    }

    pub fn update(&mut self, name: &'static str, status: InitStatus) {
        if let Some(comp) = self.entries.iter_mut().flatten().find(|c| c.name == name) {
            comp.status = status;
        }
    }

    pub fn get(&self, name: &str) -> Option<InitStatus> {
        self.iter().find(|c| c.name == name).map(|c| c.status)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentStatus> {
        self.entries.iter().flatten()
    }

    /// Check if all components are initialized
    pub fn all_ready(&self) -> bool {
        self.iter().next().is_some() && self.iter().all(|c| c.is_complete())
    }
}

static INIT_STATUS: Mutex<ComponentTable> = Mutex::new(ComponentTable::new());

pub fn component_status(name: &str) -> Option<InitStatus> {
    INIT_STATUS.lock().get(name)
}

/// Check if all components are initialized
pub fn all_components_ready() -> bool {
    INIT_STATUS.lock().all_ready()
}

/// Merges `table` into the kernel-wide record.
pub(crate) fn publish(table: &ComponentTable) -> Result<(), InitError> {
    let mut global = INIT_STATUS.lock();
    for comp in table.iter() {
        global.register(comp.name)?;
        global.update(comp.name, comp.status);
    }
    Ok(())
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStatus::NotStarted => write!(f, "Not Started"),
            InitStatus::InProgress => write!(f, "In Progress"),
            InitStatus::Completed => write!(f, "Completed"),
            InitStatus::Failed(err) => write!(f, "Failed: {}", err),
        }
    }
}
