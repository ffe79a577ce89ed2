//! Kernel console and `log` backend.
//!
//! On the bare-metal target everything goes to COM1. Host builds have no
//! serial port, so console output is dropped there; tests that care about
//! output write into their own `fmt::Write` sink instead.

use core::fmt::{self, Write};

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub static SERIAL: spin::Mutex<uart_16550::SerialPort> =
    spin::Mutex::new(unsafe { uart_16550::SerialPort::new(0x3F8) });

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::console::print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => {{
        $crate::console::print(format_args!($($arg)*));
        $crate::console::print(format_args!("\n"));
    }};
}

/// Handle to the kernel console usable wherever a `fmt::Write` sink is taken.
#[derive(Debug, Default, Clone, Copy)]
pub struct Console;

impl Write for Console {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        SERIAL.lock().write_str(s)
    }

    #[cfg(not(all(target_arch = "x86", target_os = "none")))]
    fn write_str(&mut self, _s: &str) -> fmt::Result {
        Ok(())
    }
}

pub fn print(args: fmt::Arguments) {
    let _ = Console.write_fmt(args);
}

struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = write_record(&mut Console, record);
    }

    fn flush(&self) {}
}

fn write_record(out: &mut dyn Write, record: &Record) -> fmt::Result {
    writeln!(
        out,
        "\u{1B}[{}m[{:>5}][{}] {}\u{1B}[0m",
        level_to_color_code(record.level()),
        record.level(),
        record.target(),
        record.args()
    )
}

fn level_to_color_code(level: Level) -> u8 {
    match level {
        Level::Error => 31, // Red
        Level::Warn => 93,  // BrightYellow
        Level::Info => 34,  // Blue
        Level::Debug => 32, // Green
        Level::Trace => 90, // BrightBlack
    }
}

/// Installs the console logger at `level`. Fails if a logger is already set.
pub fn init_logging(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    static LOGGER: KernelLogger = KernelLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}
