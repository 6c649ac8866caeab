//! Module defining constants related to memory management.

/// Page size
pub const PAGE_SIZE: usize = 4096;
/// Number of page table entries in one table page
pub const PTE_PER_TABLE: usize = PAGE_SIZE / 4;

/// Width of a virtual address
pub const VA_WIDTH: usize = 32;
/// Width of a virtual page number
pub const VPN_WIDTH: usize = VA_WIDTH - 12;

/// Number of frames in the physical memory pool
pub const FRAME_COUNT: usize = 4096;

/// Start of the arena in which user mappings are placed
pub const MMAP_START: usize = 0x6000_0000;
/// End (exclusive) of the arena in which user mappings are placed
pub const MMAP_END: usize = 0x8000_0000;

/// Highest address (exclusive) the user image may grow to. The image lives
/// below the mapping arena.
pub const USER_IMAGE_END: usize = MMAP_START;
