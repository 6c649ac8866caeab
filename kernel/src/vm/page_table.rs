//! Module for manipulating page tables.
//!
//! A page table is a two-level structure held in frames: a page directory
//! frame whose entries point to leaf table frames. The walker returns the
//! leaf entry slot for a virtual address, optionally creating the
//! intermediate table on the way down.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use config::mm::PTE_PER_TABLE;
use mm::{
    address::{PhysPageNum, VirtAddr, VirtPageNum},
    frame::FrameTracker,
};
use systype::error::{SysError, SysResult};

use super::pte::{PageTableEntry, PteFlags};

/// Number of TLB invalidations issued so far.
///
/// The software model has no TLB to invalidate, since the walker reads
/// entries from memory on every access, but every point where a port must
/// invalidate goes through [`tlb_flush_all`] or [`tlb_flush_page`], and this
/// counter makes those points observable.
static TLB_FLUSHES: AtomicUsize = AtomicUsize::new(0);

/// Invalidates the whole TLB for the current address space.
pub fn tlb_flush_all() {
    TLB_FLUSHES.fetch_add(1, Ordering::Relaxed);
}

/// Invalidates the TLB entry for one page.
pub fn tlb_flush_page(_va: VirtAddr) {
    TLB_FLUSHES.fetch_add(1, Ordering::Relaxed);
}

/// Returns the number of TLB invalidations issued so far.
pub fn tlb_flush_count() -> usize {
    TLB_FLUSHES.load(Ordering::Relaxed)
}

/// A data structure for manipulating a process's page table.
///
/// This struct owns the page directory frame and every leaf table frame
/// created under it; all of them are released when the `PageTable` is
/// dropped. Frames *mapped by* leaf entries are not owned here; their
/// ownership follows the mapping that installed them.
#[derive(Debug)]
pub struct PageTable {
    /// Physical page number of the page directory.
    root: PhysPageNum,
    /// Frames allocated for the directory and leaf tables.
    frames: Mutex<Vec<FrameTracker>>,
}

impl PageTable {
    /// Builds a new `PageTable` with an empty page directory.
    ///
    /// # Errors
    /// Returns an `ENOMEM` error if memory allocation for the page
    /// directory fails.
    pub fn build() -> SysResult<Self> {
        let root_frame = FrameTracker::build()?;
        // SAFETY: the frame is newly allocated for the page directory.
        unsafe {
            PageTableMem::new(root_frame.ppn()).clear();
        }
        Ok(PageTable {
            root: root_frame.ppn(),
            frames: Mutex::new(alloc::vec![root_frame]),
        })
    }

    /// Gets the physical page number of the page directory.
    pub fn root(&self) -> PhysPageNum {
        self.root
    }

    /// Returns a mutable reference to the leaf page table entry mapping a
    /// given VPN, creating the intermediate table if it is absent. Note that
    /// the returned entry may be non-present.
    ///
    /// # Errors
    /// Returns an `ENOMEM` error if a table frame is needed but cannot be
    /// allocated.
    pub fn find_entry_force(&self, vpn: VirtPageNum) -> SysResult<&'static mut PageTableEntry> {
        let mut ppn = self.root;
        for (i, index) in vpn.indices().into_iter().enumerate().rev() {
            let mut table = unsafe { PageTableMem::new(ppn) };
            let entry = table.get_entry_mut(index);
            if i == 0 {
                return Ok(entry);
            }
            if !entry.is_present() {
                let frame = FrameTracker::build()?;
                // SAFETY: the frame is newly allocated for a leaf table.
                unsafe {
                    PageTableMem::new(frame.ppn()).clear();
                }
                *entry = PageTableEntry::new(
                    frame.ppn(),
                    PteFlags::P | PteFlags::W | PteFlags::U,
                );
                self.track_frame(frame);
            }
            ppn = entry.ppn();
        }
        unreachable!();
    }

    /// Returns a mutable reference to the leaf page table entry mapping a
    /// given VPN. If the intermediate table is not present, returns `None`.
    /// Note that the returned entry may be non-present.
    pub fn find_entry(&self, vpn: VirtPageNum) -> Option<&'static mut PageTableEntry> {
        let mut ppn = self.root;
        for (i, index) in vpn.indices().into_iter().enumerate().rev() {
            let mut table = unsafe { PageTableMem::new(ppn) };
            let entry = table.get_entry_mut(index);
            if i == 0 {
                return Some(entry);
            }
            if !entry.is_present() {
                return None;
            }
            ppn = entry.ppn();
        }
        unreachable!();
    }

    /// Maps a leaf page by specifying VPN, PPN, and page table entry flags.
    ///
    /// This method does not allocate the frame for the leaf page; it only
    /// sets the mapping in the page table.
    ///
    /// # Errors
    /// Returns an `EINVAL` error if the page is already mapped. Returns an
    /// `ENOMEM` error if a table frame is needed but cannot be allocated.
    pub fn map_page_to(
        &self,
        vpn: VirtPageNum,
        ppn: PhysPageNum,
        flags: PteFlags,
    ) -> SysResult<()> {
        let entry = self.find_entry_force(vpn)?;
        if entry.is_present() {
            return Err(SysError::EINVAL);
        }
        *entry = PageTableEntry::new(ppn, flags);
        Ok(())
    }

    /// Unmaps a leaf page by specifying the VPN.
    ///
    /// This method does not deallocate the frame for the leaf page; it only
    /// clears the mapping in the page table. Calling this method on an
    /// unmapped page is safe.
    pub fn unmap_page(&self, vpn: VirtPageNum) {
        if let Some(entry) = self.find_entry(vpn) {
            if entry.is_present() {
                *entry = PageTableEntry::default();
                tlb_flush_page(vpn.address());
            }
        }
    }

    /// Adds a `FrameTracker` to the page table so that the frame is
    /// deallocated when the `PageTable` is dropped. Every table frame in the
    /// structure must be tracked by calling this method.
    fn track_frame(&self, frame: FrameTracker) {
        self.frames.lock().push(frame);
    }
}

/// A helper struct for manipulating a page table frame in memory.
#[derive(Debug)]
struct PageTableMem {
    /// Physical page number of the table frame.
    ppn: PhysPageNum,
}

impl PageTableMem {
    /// Constructs a new `PageTableMem` for the given frame.
    ///
    /// # Safety
    /// The frame must hold a valid page table (or be freshly allocated and
    /// about to be cleared), and the constructed value must not be used
    /// after the frame is deallocated.
    unsafe fn new(ppn: PhysPageNum) -> Self {
        PageTableMem { ppn }
    }

    fn as_slice_mut(&mut self) -> &'static mut [PageTableEntry; PTE_PER_TABLE] {
        // SAFETY: the frame the table lives in is allocated.
        unsafe { &mut *(self.ppn.as_slice_mut().as_mut_ptr() as *mut _) }
    }

    /// Gets the entry at the given index mutably.
    fn get_entry_mut(&mut self, index: usize) -> &'static mut PageTableEntry {
        &mut self.as_slice_mut()[index]
    }

    /// Clears the table frame.
    fn clear(&mut self) {
        self.as_slice_mut().fill(PageTableEntry::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm::page::Page;

    #[test]
    fn walk_creates_tables_on_demand() {
        let table = PageTable::build().unwrap();
        let vpn = VirtAddr::new(0x6000_0000).page_number();

        assert!(table.find_entry(vpn).is_none());

        let entry = table.find_entry_force(vpn).unwrap();
        assert!(!entry.is_present());
        // The intermediate table now exists, so the non-creating walk
        // reaches the same slot.
        assert!(table.find_entry(vpn).is_some());
    }

    #[test]
    fn map_and_unmap_page() {
        let table = PageTable::build().unwrap();
        let vpn = VirtAddr::new(0x6040_3000).page_number();
        let page = Page::build().unwrap();

        table
            .map_page_to(vpn, page.ppn(), PteFlags::P | PteFlags::W | PteFlags::U)
            .unwrap();
        let entry = *table.find_entry(vpn).unwrap();
        assert!(entry.is_present());
        assert_eq!(entry.ppn(), page.ppn());

        // Double-mapping the same page is an error.
        assert_eq!(
            table.map_page_to(vpn, page.ppn(), PteFlags::P),
            Err(SysError::EINVAL)
        );

        let flushes = tlb_flush_count();
        table.unmap_page(vpn);
        assert!(!table.find_entry(vpn).unwrap().is_present());
        assert!(tlb_flush_count() > flushes);
        // Unmapping an unmapped page is a no-op.
        table.unmap_page(vpn);
    }
}
