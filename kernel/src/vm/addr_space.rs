//! Module for managing virtual address spaces.
//!
//! An address space pairs a page table with the state describing what may
//! legally live at each address: the eagerly-populated user image, and the
//! per-process mapping table whose regions are populated lazily by the
//! page-fault handler.
//!
//! The fault handler dispatches a faulting address down three paths:
//! - a write to a present copy-on-write page gets a private copy of the
//!   frame with write permission restored;
//! - an address inside an anonymous mapping gets a zeroed frame;
//! - an address inside a file-backed mapping gets a frame filled from the
//!   backing inode, inside a file-system transaction.
//!
//! Growable mappings get one extra chance: a fault one page past the end of
//! a `MAP_GROWSUP` mapping extends it by a page when there is room below
//! the next mapping.

use alloc::{collections::btree_map::BTreeMap, sync::Arc};

use config::mm::{PAGE_SIZE, USER_IMAGE_END};
use mm::{
    address::{PhysAddr, VirtAddr, VirtPageNum},
    page::Page,
};
use systype::{
    error::{SysError, SysResult},
    memory_flags::MmapFlags,
};

use crate::fs::{self, FdTable};

use super::{
    mapping::MappingTable,
    mem_perm::MemPerm,
    page_table::{tlb_flush_all, PageTable},
    pte::{PageTableEntry, PteFlags},
};

/// Page table entry flags the fault handler installs for user pages.
///
/// The protection recorded in the mapping descriptor is not consulted here;
/// every materialised page is user-writable.
const USER_PTE: PteFlags = PteFlags::P.union(PteFlags::W).union(PteFlags::U);

/// A process's virtual address space.
///
/// See the module-level documentation for more information.
#[derive(Debug)]
pub struct AddrSpace {
    /// Page table of the address space.
    pub(super) page_table: PageTable,
    /// Pages of the user image, below the mapping arena. These are
    /// populated eagerly and copied byte-wise at fork.
    pub(super) image_pages: BTreeMap<VirtPageNum, Arc<Page>>,
    /// End of the user image.
    pub(super) image_end: VirtAddr,
    /// The mapping table.
    pub(super) mappings: MappingTable,
}

impl AddrSpace {
    /// Creates an empty address space.
    ///
    /// # Errors
    /// Returns `ENOMEM` if the page directory cannot be allocated.
    pub fn build() -> SysResult<Self> {
        Ok(AddrSpace {
            page_table: PageTable::build()?,
            image_pages: BTreeMap::new(),
            image_end: VirtAddr::new(0),
            mappings: MappingTable::new(),
        })
    }

    /// Returns the page table of the address space.
    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    /// Returns the mapping table.
    pub fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    /// Returns the end of the user image.
    pub fn image_end(&self) -> VirtAddr {
        self.image_end
    }

    /// Grows the user image to end at `new_end`, eagerly allocating zeroed,
    /// writable pages for the new range.
    ///
    /// # Errors
    /// Returns `ENOMEM` if the image would reach into the mapping arena or
    /// a frame cannot be allocated.
    pub fn grow_image(&mut self, new_end: usize) -> SysResult<()> {
        if new_end > USER_IMAGE_END {
            return Err(SysError::ENOMEM);
        }
        if new_end <= self.image_end.to_usize() {
            return Ok(());
        }
        let first = self.image_end.round_up().page_number().to_usize();
        let last = VirtAddr::new(new_end).round_up().page_number().to_usize();
        for vpn in first..last {
            let vpn = VirtPageNum::new(vpn);
            let page = Page::build()?;
            page.clear();
            self.page_table.map_page_to(vpn, page.ppn(), USER_PTE)?;
            self.image_pages.insert(vpn, Arc::new(page));
        }
        self.image_end = VirtAddr::new(new_end);
        Ok(())
    }

    /// Translates a user virtual address for the given access type.
    ///
    /// Returns `None` when the address is not mapped with sufficient
    /// permission, in which case the access must go through the fault path.
    pub fn translate(&self, va: VirtAddr, access: MemPerm) -> Option<PhysAddr> {
        let pte = self.page_table.find_entry(va.page_number())?;
        let flags = pte.flags();
        if !pte.is_present() || !flags.contains(PteFlags::U) {
            return None;
        }
        if access.contains(MemPerm::W) && !flags.contains(PteFlags::W) {
            return None;
        }
        Some(PhysAddr::new(
            pte.ppn().address().to_usize() + va.page_offset(),
        ))
    }

    /// Handles a page fault at `va`.
    ///
    /// # Errors
    /// Returns `EFAULT` if the fault cannot be resolved; the caller then
    /// treats the access as a segmentation fault.
    ///
    /// # Panics
    /// Panics if a frame cannot be allocated on the fill path. Lazy paging
    /// cannot proceed without memory, so this is a kernel panic rather than
    /// an error the faulting process could act on.
    pub fn handle_page_fault(&mut self, fd_table: &FdTable, va: VirtAddr) -> SysResult<()> {
        // A write to a present copy-on-write page resolves without
        // consulting the mapping bounds.
        if let Some(pte) = self.page_table.find_entry(va.page_number()) {
            let flags = pte.flags();
            if pte.is_present() && flags.contains(PteFlags::COW) && !flags.contains(PteFlags::W) {
                return self.resolve_cow(va);
            }
        }

        let index = self
            .mappings
            .find_fault_target(va)
            .ok_or(SysError::EFAULT)?;
        self.mappings
            .get_mut(index)
            .ok_or(SysError::EFAULT)?
            .allocated = true;

        // A fault at or past the end of a growable mapping extends it by
        // one page, provided a free page remains below the next mapping
        // (or the arena end).
        let grow = {
            let m = self.mappings.get(index).ok_or(SysError::EFAULT)?;
            if m.flags().contains(MmapFlags::MAP_GROWSUP) && va >= m.end_rounded() {
                let end_of_mapping = m.end_rounded().to_usize() + PAGE_SIZE;
                let next = self.mappings.next_boundary_above(end_of_mapping);
                next.saturating_sub(end_of_mapping) >= PAGE_SIZE
            } else {
                false
            }
        };
        if grow {
            let m = self.mappings.get_mut(index).ok_or(SysError::EFAULT)?;
            m.length += PAGE_SIZE;
            log::trace!(
                "grew mapping at {:#x} to {} bytes",
                m.addr.to_usize(),
                m.length
            );
        }

        let m = self.mappings.get(index).ok_or(SysError::EFAULT)?;
        if !m.contains(va) {
            return Err(SysError::EFAULT);
        }
        self.fill_mapping_page(fd_table, index, va)
    }

    /// Resolves a copy-on-write fault: the writer gets a private copy of
    /// the frame with write permission restored. The other address spaces
    /// sharing the frame are unaffected.
    fn resolve_cow(&mut self, va: VirtAddr) -> SysResult<()> {
        let vpn = va.page_number();
        let index = self.mappings.find_fault_target(va).ok_or_else(|| {
            log::error!(
                "copy-on-write entry at {:#x} outside any mapping",
                va.to_usize()
            );
            SysError::EFAULT
        })?;
        let pte = self
            .page_table
            .find_entry(vpn)
            .ok_or(SysError::EFAULT)?;
        let m = self.mappings.get_mut(index).ok_or(SysError::EFAULT)?;
        let old_page = m.pages.get(&vpn).ok_or_else(|| {
            log::error!("no tracked page under copy-on-write entry at {:#x}", va.to_usize());
            SysError::EFAULT
        })?;

        let new_page = Page::build()
            .unwrap_or_else(|_| panic!("handle_page_fault: out of memory resolving copy-on-write"));
        new_page.copy_from_page(old_page);

        let mut flags = pte.flags();
        flags.insert(PteFlags::W);
        flags.remove(PteFlags::COW);
        *pte = PageTableEntry::new(new_page.ppn(), flags);
        tlb_flush_all();

        // Dropping the old `Arc` releases this address space's claim on the
        // shared frame.
        m.pages.insert(vpn, Arc::new(new_page));
        Ok(())
    }

    /// Materialises the page under `va` for the mapping at `index`: a
    /// zeroed frame for anonymous mappings, a frame filled from the backing
    /// inode for file-backed ones.
    fn fill_mapping_page(
        &mut self,
        fd_table: &FdTable,
        index: usize,
        va: VirtAddr,
    ) -> SysResult<()> {
        let page_va = va.round_down();
        let (file_backed, fd, file_offset) = {
            let m = self.mappings.get(index).ok_or(SysError::EFAULT)?;
            (
                m.file_backed(),
                m.fd(),
                m.offset() + (page_va.to_usize() - m.start().to_usize()),
            )
        };

        let page = Page::build()
            .unwrap_or_else(|_| panic!("handle_page_fault: out of memory filling a page"));
        if file_backed {
            let file = fd_table.get(fd as usize).unwrap_or_else(|| {
                panic!(
                    "handle_page_fault: mapping claims file descriptor {} but it is not open",
                    fd
                )
            });
            let _tx = fs::log::begin_op();
            let data = file.inode().lock();
            let n = data.read_at(file_offset, page.as_mut_slice());
            // A short read leaves the tail past end-of-file zeroed.
            page.as_mut_slice()[n..].fill(0);
        } else {
            page.clear();
        }

        match self
            .page_table
            .map_page_to(page_va.page_number(), page.ppn(), USER_PTE)
        {
            Ok(()) => {}
            Err(SysError::ENOMEM) => {
                panic!("handle_page_fault: out of memory extending the page table")
            }
            // The slot was taken; drop the page so the frame goes back to
            // the pool and report the fault unhandled.
            Err(_) => return Err(SysError::EFAULT),
        }
        self.mappings
            .get_mut(index)
            .ok_or(SysError::EFAULT)?
            .pages
            .insert(page_va.page_number(), Arc::new(page));
        Ok(())
    }

    /// Clones the address space for a fork.
    ///
    /// The user image is copied byte-wise. Mapping descriptors are copied
    /// into the child at the same indices. Present pages of `MAP_SHARED`
    /// mappings are re-mapped into the child with the same permissions, so
    /// both processes see the same frames. Present pages of `MAP_PRIVATE`
    /// mappings are downgraded to read-only copy-on-write in *both* address
    /// spaces; the first writer on either side gets a private copy. A
    /// mapping with both bits set behaves as shared.
    ///
    /// # Errors
    /// Returns `ENOMEM` if a frame for the image copy cannot be allocated.
    ///
    /// # Panics
    /// Panics if a page table entry for the child cannot be created.
    pub fn clone_for_fork(&mut self) -> SysResult<AddrSpace> {
        let mut child = AddrSpace::build()?;
        child.image_end = self.image_end;

        for (&vpn, page) in &self.image_pages {
            let new_page = Page::build()?;
            new_page.copy_from_page(page);
            child
                .page_table
                .map_page_to(vpn, new_page.ppn(), USER_PTE)
                .unwrap_or_else(|_| panic!("fork: cannot allocate child page table entry"));
            child.image_pages.insert(vpn, Arc::new(new_page));
        }

        for index in 0..self.mappings.len() {
            let m = self.mappings.get(index).ok_or(SysError::EFAULT)?;
            let child_mapping = m.clone();
            let first = m.start().page_number().to_usize();
            let last = m.end_rounded().page_number().to_usize();
            let flags = m.flags();

            if flags.contains(MmapFlags::MAP_SHARED) {
                for vpn in first..last {
                    let vpn = VirtPageNum::new(vpn);
                    if let Some(pte) = self.page_table.find_entry(vpn) {
                        if pte.is_present() {
                            let child_pte = child
                                .page_table
                                .find_entry_force(vpn)
                                .unwrap_or_else(|_| {
                                    panic!("fork: cannot allocate child page table entry")
                                });
                            *child_pte = *pte;
                        }
                    }
                }
            } else if flags.contains(MmapFlags::MAP_PRIVATE) {
                for vpn in first..last {
                    let vpn = VirtPageNum::new(vpn);
                    if let Some(pte) = self.page_table.find_entry(vpn) {
                        if pte.is_present() {
                            let mut new_flags = pte.flags();
                            new_flags.remove(PteFlags::W);
                            new_flags.insert(PteFlags::COW);
                            pte.set_flags(new_flags);
                            tlb_flush_all();

                            let child_pte = child
                                .page_table
                                .find_entry_force(vpn)
                                .unwrap_or_else(|_| {
                                    panic!("fork: cannot allocate child page table entry")
                                });
                            *child_pte = *pte;
                        }
                    }
                }
            }

            child.mappings.push(child_mapping);
        }

        Ok(child)
    }

    /// Clears the mapping table at process exit.
    ///
    /// Frames under the mappings are released as their last owners drop;
    /// page-table teardown happens when the address space itself is
    /// dropped. No write-back is performed on exit.
    pub fn clear_mappings(&mut self) {
        self.mappings.clear();
    }
}
