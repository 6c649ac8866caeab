//! Module for abstracting memory access types.

use bitflags::bitflags;

bitflags! {
    /// The type of a user memory access, as reported with a page fault.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemPerm: u8 {
        /// Read access.
        const R = 1 << 0;
        /// Write access.
        const W = 1 << 1;
    }
}
