//! Module defining constants related to processes.

/// Maximum number of open files per process
pub const NOFILE: usize = 16;

/// Maximum number of memory mappings per process
pub const MAX_MAPPINGS: usize = 32;
