//! Kernel-side implementation of the logging interface.
//!
//! The logger crate decides whether a record passes the threshold; this
//! module owns how a record looks on the console.

use core::fmt;

use log::Level;
use spin::Mutex;

use logger::LogInterface;

static LOG_LOCK: Mutex<()> = Mutex::new(());

/// ANSI color for each severity.
fn level_color(level: Level) -> u8 {
    match level {
        Level::Error => 31, // red
        Level::Warn => 33,  // yellow
        Level::Info => 32,  // green
        Level::Debug => 36, // cyan
        Level::Trace => 90, // gray
    }
}

fn print_in_color(args: fmt::Arguments, color_code: u8) {
    crate::print!("\u{1B}[{}m{}\u{1B}[0m", color_code, args);
}

struct LogInterfaceImpl;

#[crate_interface::impl_interface]
impl LogInterface for LogInterfaceImpl {
    fn print_log(record: &log::Record) {
        let _guard = LOG_LOCK.lock();
        print_in_color(
            format_args!(
                "[{:<5}] {}:{}: {}\n",
                record.level(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            ),
            level_color(record.level()),
        );
    }
}

/// Installs the kernel logger.
pub fn init() {
    logger::init();
}
