//! A small teaching kernel's memory subsystem: per-process memory mappings
//! with demand paging and copy-on-write.
//!
//! The kernel is organised the usual way:
//! - [`vm`]: address spaces, the mapping table, the page table walker, and
//!   the page-fault handler.
//! - [`fs`]: the in-memory file layer (inodes, open files, the log).
//! - [`task`]: processes, fork and exit.
//! - [`trap`]: the page-fault vector.
//! - [`syscall`]: the `mmap`/`munmap` system call surface.
//!
//! The machine is modelled in software: physical memory is the frame pool of
//! the `mm` crate, and user memory accesses go through [`vm::uaccess`],
//! which plays the MMU and delivers page faults to the trap path.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod console;

pub mod fs;
pub mod logging;
pub mod syscall;
pub mod task;
pub mod trap;
pub mod vm;

/// Initialises kernel-wide facilities (currently just logging). Safe to call
/// more than once.
pub fn init() {
    logging::init();
}
