//! Module for flag types of the `mmap` and `munmap` system calls.

use bitflags::bitflags;

bitflags! {
    /// Memory protection flags for the `mmap` system call.
    ///
    /// The protection requested by the user is recorded in the mapping
    /// descriptor but is not enforced at fault time; the fault handler
    /// installs user-writable pages regardless.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MmapProt: i32 {
        /// No access.
        const PROT_NONE = 0x0;
        /// Page can be read.
        const PROT_READ = 0x1;
        /// Page can be written.
        const PROT_WRITE = 0x2;
    }
}

bitflags! {
    /// Flags for the `mmap` system call that specify how the memory should
    /// be mapped.
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MmapFlags: i32 {
        // Sharing types. At least one of these must be set.
        /// Share changes.
        const MAP_SHARED = 0x01;
        /// Changes are private (copy-on-write across fork).
        const MAP_PRIVATE = 0x02;

        /// Interpret addr exactly.
        const MAP_FIXED = 0x10;
        /// Don't use a file.
        const MAP_ANONYMOUS = 0x20;
        /// The mapping may grow upward one page at a time on faults past
        /// its end, while a free page remains below the next mapping.
        const MAP_GROWSUP = 0x100;
    }
}
