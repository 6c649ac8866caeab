//! The `mmap` and `munmap` services.
//!
//! `mmap` validates, places, and records a mapping; it never touches the
//! page table. Frames appear only when the fault handler materialises
//! pages on first access.
//!
//! `munmap` is the write-back point: resident pages of a shared
//! file-backed mapping are flushed to the backing inode before the
//! descriptor and its frames are released.

use alloc::vec;

use config::{
    mm::{MMAP_END, MMAP_START, PAGE_SIZE},
    process::NOFILE,
};
use mm::address::{VirtAddr, VirtPageNum};
use systype::{
    error::{SysError, SysResult},
    memory_flags::{MmapFlags, MmapProt},
};

use crate::fs::{self, FdTable};

use super::{addr_space::AddrSpace, mapping::Mapping};

impl AddrSpace {
    /// Creates a memory mapping.
    ///
    /// `hint` is honored verbatim for `MAP_FIXED` and ignored otherwise;
    /// non-fixed placements always come from the first-fit search over the
    /// arena. Returns the base address of the new mapping.
    ///
    /// A fixed placement replaces any existing mapping it overlaps: the
    /// incumbents are discarded whole, without write-back, and the new
    /// mapping wins.
    ///
    /// # Errors
    /// Returns `EINVAL` for a bad length, hint, or flag combination,
    /// `EBADF` for a file-backed request without an open descriptor, and
    /// `ENOMEM` when the table is full or no arena slot fits. Failures
    /// leave the address space untouched.
    pub fn mmap(
        &mut self,
        fd_table: &FdTable,
        hint: usize,
        length: usize,
        prot: MmapProt,
        flags: MmapFlags,
        fd: isize,
        offset: usize,
    ) -> SysResult<usize> {
        if length == 0 {
            return Err(SysError::EINVAL);
        }
        if hint != 0
            && (hint < MMAP_START || hint > MMAP_END - PAGE_SIZE || hint % PAGE_SIZE != 0)
        {
            return Err(SysError::EINVAL);
        }
        // At least one placement class. Both set is accepted and behaves as
        // shared.
        if !flags.intersects(MmapFlags::MAP_SHARED | MmapFlags::MAP_PRIVATE) {
            return Err(SysError::EINVAL);
        }
        if flags.contains(MmapFlags::MAP_ANONYMOUS) && (fd != -1 || offset != 0) {
            return Err(SysError::EINVAL);
        }
        if flags.contains(MmapFlags::MAP_FIXED) && hint == 0 {
            return Err(SysError::EINVAL);
        }
        if !flags.contains(MmapFlags::MAP_ANONYMOUS)
            && (fd < 0 || fd as usize >= NOFILE || fd_table.get(fd as usize).is_none())
        {
            return Err(SysError::EBADF);
        }
        if self.mappings.is_full() {
            return Err(SysError::ENOMEM);
        }

        let rounded_len = length
            .checked_add(PAGE_SIZE - 1)
            .ok_or(SysError::EINVAL)?
            & !(PAGE_SIZE - 1);

        let addr = if flags.contains(MmapFlags::MAP_FIXED) {
            let end = hint.checked_add(rounded_len).ok_or(SysError::EINVAL)?;
            if end > MMAP_END {
                return Err(SysError::EINVAL);
            }
            for index in self.mappings.overlapping_indices(hint, end) {
                log::debug!(
                    "mmap: fixed placement at {:#x} replaces mapping {}",
                    hint,
                    index
                );
                self.discard_mapping(index);
            }
            VirtAddr::new(hint)
        } else {
            self.mappings.find_free(length).ok_or(SysError::ENOMEM)?
        };

        self.mappings
            .push(Mapping::new(addr, length, flags, prot, fd, offset));
        log::trace!(
            "mmap: placed {} bytes at {:#x}, flags {:?}",
            length,
            addr.to_usize(),
            flags
        );
        Ok(addr.to_usize())
    }

    /// Removes the mapping fully containing `[addr, addr + length)`.
    ///
    /// For a shared file-backed mapping, every resident page in the range
    /// is first written back to the inode at the offset it was mapped
    /// from, inside a file-system transaction with the inode lock held.
    /// Only whole-mapping unmaps are supported: the containing descriptor
    /// is removed outright, its remaining frames freed and page table
    /// entries cleared.
    ///
    /// # Errors
    /// Returns `EINVAL` if no single mapping fully contains the range.
    /// A failed write-back propagates its error and leaves the descriptor
    /// in place.
    pub fn munmap(&mut self, fd_table: &FdTable, addr: usize, length: usize) -> SysResult<()> {
        let index = self
            .mappings
            .find_containing_range(addr, length)
            .ok_or(SysError::EINVAL)?;

        let (write_back, fd, base, file_base) = {
            let m = self.mappings.get(index).ok_or(SysError::EINVAL)?;
            (
                m.flags().contains(MmapFlags::MAP_SHARED)
                    && !m.flags().contains(MmapFlags::MAP_ANONYMOUS)
                    && m.fd() >= 0,
                m.fd(),
                m.start().to_usize(),
                m.offset(),
            )
        };

        if write_back {
            let file = fd_table.get(fd as usize).unwrap_or_else(|| {
                panic!(
                    "munmap: mapping claims file descriptor {} but it is not open",
                    fd
                )
            });
            let mut va = addr;
            while va < addr + length {
                let vpn = VirtAddr::new(va).round_down().page_number();
                if let Some(pte) = self.page_table.find_entry(vpn) {
                    if pte.is_present() {
                        let mut buf = vec![0u8; PAGE_SIZE];
                        // SAFETY: a present user entry points at a frame
                        // owned by this mapping.
                        buf.copy_from_slice(unsafe { pte.ppn().as_slice() });
                        let _tx = fs::log::begin_op();
                        let mut data = file.inode().lock();
                        data.write_at(file_base + (va - base), &buf)?;
                    }
                }
                va += PAGE_SIZE;
            }
        }

        self.discard_mapping(index);
        Ok(())
    }

    /// Drops the mapping at `index`: clears its page table entries and
    /// releases this address space's claim on its frames. No write-back.
    pub(super) fn discard_mapping(&mut self, index: usize) {
        let m = self.mappings.remove(index);
        let first = m.start().page_number().to_usize();
        let last = m.end_rounded().page_number().to_usize();
        for vpn in first..last {
            self.page_table.unmap_page(VirtPageNum::new(vpn));
        }
        // Frames shared with other address spaces survive; the rest are
        // freed as `m` drops here.
    }
}
