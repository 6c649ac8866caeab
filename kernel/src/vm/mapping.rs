//! Module for the per-process mapping table.
//!
//! A [`Mapping`] describes one user region created by `mmap`: where it
//! lives, how long it is, what backs it, and which pages have been
//! materialised so far. A process owns up to `MAX_MAPPINGS` of them in a
//! [`MappingTable`], densely packed in creation order.
//!
//! The table also owns placement: [`MappingTable::find_free`] searches the
//! arena `[MMAP_START, MMAP_END)` first-fit, ascending one page at a time.
//!
//! The table needs no lock of its own: it is only ever touched by the owning
//! process from inside its own kernel entry.

use alloc::{collections::btree_map::BTreeMap, sync::Arc, vec::Vec};
use core::fmt::{self, Debug, Formatter};

use config::{
    mm::{MMAP_END, MMAP_START, PAGE_SIZE},
    process::MAX_MAPPINGS,
};
use mm::{
    address::{VirtAddr, VirtPageNum},
    page::Page,
};
use systype::memory_flags::{MmapFlags, MmapProt};

/// One user memory mapping.
#[derive(Clone)]
pub struct Mapping {
    /// Base virtual address, page-aligned.
    pub(super) addr: VirtAddr,
    /// Length in bytes as requested by the user (not rounded).
    pub(super) length: usize,
    /// Length at creation; growable mappings move `length` past this.
    pub(super) original_length: usize,
    /// Mapping flags.
    pub(super) flags: MmapFlags,
    /// Requested protection. Recorded only; the fault handler installs
    /// user-writable pages regardless.
    pub(super) prot: MmapProt,
    /// Backing file descriptor, or `-1` for anonymous mappings.
    pub(super) fd: isize,
    /// Offset into the backing file at which the mapping starts.
    pub(super) offset: usize,
    /// Whether at least one page has been materialised.
    pub(super) allocated: bool,
    /// Pages materialised so far. An `Arc` here may be shared with another
    /// address space (fork-time COW, shared mappings).
    pub(super) pages: BTreeMap<VirtPageNum, Arc<Page>>,
}

impl Mapping {
    /// Creates a descriptor for a new, unpopulated mapping.
    pub fn new(
        addr: VirtAddr,
        length: usize,
        flags: MmapFlags,
        prot: MmapProt,
        fd: isize,
        offset: usize,
    ) -> Self {
        Mapping {
            addr,
            length,
            original_length: length,
            flags,
            prot,
            fd,
            offset,
            allocated: false,
            pages: BTreeMap::new(),
        }
    }

    /// Returns the base address of the mapping.
    pub fn start(&self) -> VirtAddr {
        self.addr
    }

    /// Returns the user-requested length in bytes.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Returns the length the mapping was created with.
    pub fn original_length(&self) -> usize {
        self.original_length
    }

    /// Returns the end of the mapping rounded up to a page boundary.
    pub fn end_rounded(&self) -> VirtAddr {
        VirtAddr::new(self.addr.to_usize() + self.length).round_up()
    }

    /// Returns the mapping flags.
    pub fn flags(&self) -> MmapFlags {
        self.flags
    }

    /// Returns the recorded protection.
    pub fn prot(&self) -> MmapProt {
        self.prot
    }

    /// Returns the backing file descriptor, `-1` if anonymous.
    pub fn fd(&self) -> isize {
        self.fd
    }

    /// Returns the offset into the backing file.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns whether any page of the mapping has been materialised.
    pub fn allocated(&self) -> bool {
        self.allocated
    }

    /// Returns the pages materialised so far, keyed by page number.
    pub fn pages(&self) -> &BTreeMap<VirtPageNum, Arc<Page>> {
        &self.pages
    }

    /// Returns whether the mapping is backed by a file.
    pub fn file_backed(&self) -> bool {
        !self.flags.contains(MmapFlags::MAP_ANONYMOUS) && self.fd >= 0
    }

    /// Returns whether `va` falls inside the mapping's page-rounded range.
    pub fn contains(&self, va: VirtAddr) -> bool {
        va >= self.addr && va < self.end_rounded()
    }

    /// Returns whether `va` falls in the single guard page just past the end
    /// of a growable mapping, where a fault may trigger an extension.
    pub fn in_growsup_guard(&self, va: VirtAddr) -> bool {
        self.flags.contains(MmapFlags::MAP_GROWSUP)
            && va >= self.end_rounded()
            && va.to_usize() < self.end_rounded().to_usize() + PAGE_SIZE
    }

    /// Returns whether the mapping's page-rounded range intersects
    /// `[start, end)`.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.addr.to_usize() < end && self.end_rounded().to_usize() > start
    }
}

impl Debug for Mapping {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("addr", &format_args!("{:#x}", self.addr.to_usize()))
            .field("length", &self.length)
            .field("flags", &self.flags)
            .field("prot", &self.prot)
            .field("fd", &self.fd)
            .field("offset", &self.offset)
            .field("allocated", &self.allocated)
            .field("resident", &self.pages.len())
            .finish()
    }
}

/// The per-process mapping table.
///
/// Live descriptors occupy `[0, len)` in creation order; removal shifts the
/// tail down by one. The capacity bound keeps linear scans cheap.
#[derive(Clone, Default)]
pub struct MappingTable {
    entries: Vec<Mapping>,
}

impl MappingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        MappingTable {
            entries: Vec::new(),
        }
    }

    /// Returns the number of live mappings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the table has no live mappings.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns whether the table is at capacity.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX_MAPPINGS
    }

    /// Returns the mapping at the given index.
    pub fn get(&self, index: usize) -> Option<&Mapping> {
        self.entries.get(index)
    }

    /// Returns the mapping at the given index mutably.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Mapping> {
        self.entries.get_mut(index)
    }

    /// Iterates over the live mappings in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.entries.iter()
    }

    /// Appends a descriptor.
    ///
    /// The caller must have checked [`Self::is_full`].
    pub fn push(&mut self, mapping: Mapping) {
        debug_assert!(!self.is_full());
        self.entries.push(mapping);
    }

    /// Removes the descriptor at the given index, shifting later entries
    /// down by one.
    pub fn remove(&mut self, index: usize) -> Mapping {
        self.entries.remove(index)
    }

    /// Removes every descriptor.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Finds a free, page-aligned slot of `length` bytes in the arena.
    ///
    /// The search is first-fit, ascending from `MMAP_START` one page at a
    /// time. A candidate `[addr, addr + length)` is rejected if it overlaps
    /// any existing mapping's page-rounded range. Returns `None` when no
    /// slot fits.
    pub fn find_free(&self, length: usize) -> Option<VirtAddr> {
        if length > MMAP_END - MMAP_START {
            return None;
        }
        let mut addr = MMAP_START;
        while addr + length <= MMAP_END {
            let overlap = self.entries.iter().any(|m| m.overlaps(addr, addr + length));
            if !overlap {
                return Some(VirtAddr::new(addr));
            }
            addr += PAGE_SIZE;
        }
        None
    }

    /// Finds the first mapping whose page-rounded range contains `va`, or,
    /// for growable mappings, whose guard page contains `va`.
    pub fn find_fault_target(&self, va: VirtAddr) -> Option<usize> {
        self.entries
            .iter()
            .position(|m| m.contains(va) || m.in_growsup_guard(va))
    }

    /// Finds the first mapping whose raw range `[addr, addr + length)` fully
    /// contains `[start, start + len)`.
    pub fn find_containing_range(&self, start: usize, len: usize) -> Option<usize> {
        let end = start.checked_add(len)?;
        self.entries.iter().position(|m| {
            start >= m.addr.to_usize() && end <= m.addr.to_usize() + m.length
        })
    }

    /// Returns the base address of the lowest mapping at or above `addr`,
    /// or the end of the arena if there is none. Used to bound growable
    /// mappings.
    pub fn next_boundary_above(&self, addr: usize) -> usize {
        self.entries
            .iter()
            .map(|m| m.addr.to_usize())
            .filter(|&start| start >= addr)
            .min()
            .unwrap_or(MMAP_END)
    }

    /// Returns the indices of every mapping overlapping `[start, end)`, in
    /// descending order so they can be removed one by one.
    pub fn overlapping_indices(&self, start: usize, end: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, m)| m.overlaps(start, end))
            .map(|(i, _)| i)
            .collect();
        indices.reverse();
        indices
    }
}

impl Debug for MappingTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anon(addr: usize, length: usize) -> Mapping {
        Mapping::new(
            VirtAddr::new(addr),
            length,
            MmapFlags::MAP_PRIVATE | MmapFlags::MAP_ANONYMOUS,
            MmapProt::PROT_READ | MmapProt::PROT_WRITE,
            -1,
            0,
        )
    }

    #[test]
    fn first_fit_starts_at_the_arena_base() {
        let table = MappingTable::new();
        assert_eq!(table.find_free(PAGE_SIZE), Some(VirtAddr::new(MMAP_START)));
    }

    #[test]
    fn first_fit_skips_existing_mappings() {
        let mut table = MappingTable::new();
        // A fixed placement 16 pages into the arena.
        table.push(anon(0x6001_0000, PAGE_SIZE));
        // A one-page request fits below it.
        assert_eq!(table.find_free(PAGE_SIZE), Some(VirtAddr::new(MMAP_START)));
        // A 17-page request does not; it lands just past the mapping.
        assert_eq!(
            table.find_free(17 * PAGE_SIZE),
            Some(VirtAddr::new(0x6001_1000))
        );
    }

    #[test]
    fn overlap_uses_the_incumbent_rounded_end() {
        let mut table = MappingTable::new();
        // An unrounded length still occupies its last partial page.
        table.push(anon(MMAP_START, PAGE_SIZE + 1));
        assert_eq!(
            table.find_free(PAGE_SIZE),
            Some(VirtAddr::new(MMAP_START + 2 * PAGE_SIZE))
        );
    }

    #[test]
    fn find_free_gives_up_when_the_arena_is_exhausted() {
        let mut table = MappingTable::new();
        table.push(anon(MMAP_START, PAGE_SIZE));
        assert!(table.find_free(MMAP_END - MMAP_START).is_none());
    }

    #[test]
    fn fault_target_is_the_first_match_in_table_order() {
        let mut table = MappingTable::new();
        table.push(anon(0x6000_0000, 2 * PAGE_SIZE));
        table.push(anon(0x6000_4000, PAGE_SIZE));
        assert_eq!(table.find_fault_target(VirtAddr::new(0x6000_1fff)), Some(0));
        assert_eq!(table.find_fault_target(VirtAddr::new(0x6000_4123)), Some(1));
        assert_eq!(table.find_fault_target(VirtAddr::new(0x6000_2000)), None);
    }

    #[test]
    fn growsup_guard_page_is_a_fault_target() {
        let mut table = MappingTable::new();
        let mut m = anon(0x6000_0000, PAGE_SIZE);
        m.flags |= MmapFlags::MAP_GROWSUP;
        table.push(m);
        table.push(anon(0x6000_4000, PAGE_SIZE));

        // One page past the end is the guard page; further out is not.
        assert_eq!(table.find_fault_target(VirtAddr::new(0x6000_1000)), Some(0));
        assert_eq!(table.find_fault_target(VirtAddr::new(0x6000_2000)), None);
    }

    #[test]
    fn removal_shifts_the_tail_down() {
        let mut table = MappingTable::new();
        table.push(anon(0x6000_0000, PAGE_SIZE));
        table.push(anon(0x6000_1000, PAGE_SIZE));
        table.push(anon(0x6000_2000, PAGE_SIZE));
        table.remove(1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().start().to_usize(), 0x6000_0000);
        assert_eq!(table.get(1).unwrap().start().to_usize(), 0x6000_2000);
    }

    #[test]
    fn next_boundary_above_falls_back_to_the_arena_end() {
        let mut table = MappingTable::new();
        table.push(anon(0x6000_4000, PAGE_SIZE));
        assert_eq!(table.next_boundary_above(0x6000_0000), 0x6000_4000);
        assert_eq!(table.next_boundary_above(0x6000_5000), MMAP_END);
    }
}
