//! Kernel console output.
//!
//! Console output is collected in an in-memory buffer, the software model's
//! stand-in for a UART. An embedder (or a test) drains it with
//! [`take_output`]. The buffer is bounded; when it overflows without being
//! drained, it is dropped wholesale.

use alloc::string::String;
use core::fmt::{self, Write};

use spin::Mutex;

const CONSOLE_BUF_LIMIT: usize = 64 * 1024;

static CONSOLE: Mutex<String> = Mutex::new(String::new());

pub fn console_print(args: fmt::Arguments) {
    let mut buf = CONSOLE.lock();
    if buf.len() > CONSOLE_BUF_LIMIT {
        buf.clear();
    }
    // Writing to a `String` cannot fail.
    let _ = buf.write_fmt(args);
}

/// Drains and returns everything printed to the console so far.
pub fn take_output() -> String {
    core::mem::take(&mut *CONSOLE.lock())
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::console::console_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => { $crate::print!("\n") };
    ($($arg:tt)*) => {
        $crate::console::console_print(format_args!("{}\n", format_args!($($arg)*)))
    };
}
