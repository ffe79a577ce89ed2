//! # Kernel Trap Configuration
//!
//! Segment selectors, memory-layout constants and the knobs the trap core
//! takes from the rest of the kernel.
//!
//! ## GDT Layout
//!
//! | Selector | Segment            | DPL |
//! |----------|--------------------|-----|
//! | 0x00     | null               | -   |
//! | 0x08     | kernel text        | 0   |
//! | 0x10     | kernel data        | 0   |
//! | 0x18     | user text          | 3   |
//! | 0x20     | user data          | 3   |
//! | 0x28     | TSS for CPU 0      | 0   |

use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

/// Kernel text segment.
pub const GD_KT: SegmentSelector = SegmentSelector::new(1, PrivilegeLevel::Ring0);
/// Kernel data segment.
pub const GD_KD: SegmentSelector = SegmentSelector::new(2, PrivilegeLevel::Ring0);
/// User text segment.
pub const GD_UT: SegmentSelector = SegmentSelector::new(3, PrivilegeLevel::Ring0);
/// User data segment.
pub const GD_UD: SegmentSelector = SegmentSelector::new(4, PrivilegeLevel::Ring0);
/// Task state segment of the boot CPU.
pub const GD_TSS0: SegmentSelector = SegmentSelector::new(5, PrivilegeLevel::Ring0);

/// Number of descriptors in the kernel GDT.
pub const GDT_ENTRIES: usize = 6;

/// Top of the kernel stack; the CPU switches here on a ring 3 -> ring 0 trap.
pub const KSTACKTOP: u32 = 0xF000_0000;

/// Software interrupt vector used for system calls (`int $0x30`).
pub const T_SYSCALL: u32 = 48;

/// Per-CPU trap setup parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapConfig {
    pub kernel_stack_top: u32,
    pub kernel_code: SegmentSelector,
    pub kernel_data: SegmentSelector,
    pub tss_selector: SegmentSelector,
}

impl Default for TrapConfig {
    fn default() -> Self {
        Self {
            kernel_stack_top: KSTACKTOP,
            kernel_code: GD_KT,
            kernel_data: GD_KD,
            tss_selector: GD_TSS0,
        }
    }
}

/// Log level baked in at build time through the `LOG` environment variable.
pub fn log_level() -> log::LevelFilter {
    parse_log_level(option_env!("LOG"))
}

/// Unset or unrecognized values fall back to `warn`.
pub fn parse_log_level(value: Option<&str>) -> log::LevelFilter {
    match value {
        Some("error") => log::LevelFilter::Error,
        Some("warn") => log::LevelFilter::Warn,
        Some("info") => log::LevelFilter::Info,
        Some("debug") => log::LevelFilter::Debug,
        Some("trace") => log::LevelFilter::Trace,
        Some("off") => log::LevelFilter::Off,
        _ => log::LevelFilter::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::LevelFilter;

    #[test]
    fn log_level_names_map_to_filters() {
        assert_eq!(parse_log_level(Some("error")), LevelFilter::Error);
        assert_eq!(parse_log_level(Some("info")), LevelFilter::Info);
        assert_eq!(parse_log_level(Some("debug")), LevelFilter::Debug);
        assert_eq!(parse_log_level(Some("trace")), LevelFilter::Trace);
        assert_eq!(parse_log_level(Some("off")), LevelFilter::Off);
    }

    #[test]
    fn log_level_defaults_to_warn() {
        assert_eq!(parse_log_level(None), LevelFilter::Warn);
        assert_eq!(parse_log_level(Some("verbose")), LevelFilter::Warn);
        assert_eq!(log_level(), parse_log_level(option_env!("LOG")));
    }

    #[test]
    fn default_context_uses_boot_cpu_selectors() {
        let config = TrapConfig::default();
        assert_eq!(config.kernel_stack_top, 0xF000_0000);
        assert_eq!(config.kernel_code.0, 0x08);
        assert_eq!(config.kernel_data.0, 0x10);
        assert_eq!(config.tss_selector.0, 0x28);
        assert_eq!((GD_UT.0, GD_UD.0), (0x18, 0x20));
    }
}
