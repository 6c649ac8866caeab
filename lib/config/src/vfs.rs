//! Module defining constants related to the file system.

/// Maximum size of a regular file in bytes
pub const MAX_FILE_SIZE: usize = 1024 * 1024;
