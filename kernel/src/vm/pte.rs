//! Module for page table entries.
//!
//! This module provides a `PageTableEntry` struct, which represents a page
//! table entry, along with functions for creating and manipulating page
//! table entries.

use core::fmt::{self, Debug, Formatter};

use bitflags::bitflags;

use mm::address::PhysPageNum;

/// Bit position of the physical page number within an entry.
const PPN_OFFSET: u32 = 12;

bitflags! {
    /// Flags of a page table entry.
    ///
    /// The low flag bits follow the x86 layout. `COW` claims one of the
    /// bits the hardware ignores, and marks a page shared copy-on-write
    /// after a fork. A `COW` entry is never writable; the copy-on-write
    /// fault clears the bit when it installs the private copy.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        /// Present.
        const P = 1 << 0;
        /// Writable.
        const W = 1 << 1;
        /// User-accessible.
        const U = 1 << 2;
        /// Copy-on-write (software bit).
        const COW = 1 << 9;
    }
}

/// A page table entry.
///
/// Both page directory entries and leaf entries use this type; a directory
/// entry's page number names the table frame one level down.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct PageTableEntry {
    bits: u32,
}

impl PageTableEntry {
    /// Creates a page table entry from the given physical page number and
    /// flags.
    pub fn new(ppn: PhysPageNum, flags: PteFlags) -> Self {
        PageTableEntry {
            bits: (ppn.to_usize() as u32) << PPN_OFFSET | flags.bits(),
        }
    }

    /// Returns the physical page number in the page table entry.
    pub fn ppn(self) -> PhysPageNum {
        PhysPageNum::new((self.bits >> PPN_OFFSET) as usize)
    }

    /// Returns the flags in the page table entry.
    pub fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.bits)
    }

    /// Sets the physical page number in the page table entry.
    pub fn set_ppn(&mut self, ppn: PhysPageNum) {
        let ppn_mask = !0u32 << PPN_OFFSET;
        self.bits = (self.bits & !ppn_mask) | ((ppn.to_usize() as u32) << PPN_OFFSET);
    }

    /// Sets the flags in the page table entry.
    pub fn set_flags(&mut self, flags: PteFlags) {
        let flags_mask = PteFlags::all().bits();
        self.bits = (self.bits & !flags_mask) | flags.bits();
    }

    /// Returns whether the entry is present.
    pub fn is_present(self) -> bool {
        self.flags().contains(PteFlags::P)
    }
}

impl Debug for PageTableEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageTableEntry")
            .field("ppn", &self.ppn().to_usize())
            .field("flags", &self.flags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_layout_round_trips() {
        let ppn = PhysPageNum::new(0x123);
        let mut pte = PageTableEntry::new(ppn, PteFlags::P | PteFlags::U);
        assert_eq!(pte.ppn(), ppn);
        assert_eq!(pte.flags(), PteFlags::P | PteFlags::U);
        assert!(pte.is_present());

        pte.set_flags(pte.flags() | PteFlags::COW);
        assert_eq!(pte.ppn(), ppn);
        assert!(pte.flags().contains(PteFlags::COW));

        pte.set_ppn(PhysPageNum::new(0x456));
        assert_eq!(pte.ppn().to_usize(), 0x456);
        assert!(pte.flags().contains(PteFlags::COW));

        assert!(!PageTableEntry::default().is_present());
    }
}
