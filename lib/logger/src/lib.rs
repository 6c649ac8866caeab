//! Crate wiring the `log` facade to the kernel console.
//!
//! The output routine lives in the kernel, which implements
//! [`LogInterface`] on top of its console. The indirection through
//! `crate_interface` keeps this crate free of a dependency on the kernel.
//!
//! Formatting and coloring are the console side's business; this crate only
//! decides whether a record passes the severity threshold.

#![cfg_attr(not(test), no_std)]

use crate_interface::call_interface;
use log::{LevelFilter, Metadata, Record};

/// Level names accepted in the `LOG` environment variable, coarsest first.
const LEVEL_NAMES: [(&str, LevelFilter); 5] = [
    ("error", LevelFilter::Error),
    ("warn", LevelFilter::Warn),
    ("info", LevelFilter::Info),
    ("debug", LevelFilter::Debug),
    ("trace", LevelFilter::Trace),
];

struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            call_interface!(LogInterface::print_log(record));
        }
    }

    fn flush(&self) {}
}

/// Interface through which log records reach the console.
///
/// The kernel implements this with `#[crate_interface::impl_interface]`.
#[crate_interface::def_interface]
pub trait LogInterface: Send + Sync {
    fn print_log(record: &Record);
}

/// Installs the logger.
///
/// The severity threshold is chosen by the `LOG` environment variable at
/// compile time; an unset or unrecognised value disables logging.
pub fn init() {
    static LOGGER: KernelLogger = KernelLogger;
    log::set_logger(&LOGGER).ok();
    let level = option_env!("LOG")
        .and_then(|name| {
            LEVEL_NAMES
                .iter()
                .find(|(known, _)| *known == name)
                .map(|&(_, filter)| filter)
        })
        .unwrap_or(LevelFilter::Off);
    log::set_max_level(level);
}
