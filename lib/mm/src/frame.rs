//! Module for managing allocatable frames (physical pages).
//!
//! Physical memory is modelled as a pool of `config::mm::FRAME_COUNT`
//! page-aligned frames, allocated once on first use. A bitmap allocator
//! hands out physical page numbers into the pool.
//!
//! Allocatable frames are tracked by [`FrameTracker`]. A frame can be
//! allocated by constructing a [`FrameTracker`], and it will be deallocated
//! automatically when the [`FrameTracker`] is dropped.

use alloc::alloc::{alloc_zeroed, Layout};

use bitmap_allocator::{BitAlloc, BitAlloc64K};
use lazy_static::lazy_static;
use spin::Mutex;

use config::mm::{FRAME_COUNT, PAGE_SIZE};
use systype::error::{SysError, SysResult};

use crate::address::PhysPageNum;

lazy_static! {
    /// Global frame pool. It owns the backing memory and allocates and
    /// deallocates frames out of it.
    static ref FRAME_POOL: FramePool = FramePool::new();
}

/// Frame pool type.
struct FramePool {
    /// Base address of the pool's backing memory.
    base: usize,
    /// Bitmap allocator over pool indices.
    allocator: Mutex<BitAlloc64K>,
}

// The base pointer is never mutated after construction, and the memory it
// points to is only reached through allocated frames.
unsafe impl Send for FramePool {}
unsafe impl Sync for FramePool {}

impl FramePool {
    fn new() -> Self {
        let layout = Layout::from_size_align(FRAME_COUNT * PAGE_SIZE, PAGE_SIZE)
            .expect("frame pool layout");
        // The pool lives for the rest of the kernel's lifetime.
        let base = unsafe { alloc_zeroed(layout) };
        assert!(!base.is_null(), "failed to reserve the frame pool");

        let mut allocator = BitAlloc64K::DEFAULT;
        // Frame 0 is never handed out, so a physical page number of zero
        // always means "no frame".
        allocator.insert(1..FRAME_COUNT);

        log::debug!(
            "frame pool: {} allocatable frames at {:p}",
            FRAME_COUNT - 1,
            base
        );
        FramePool {
            base: base as usize,
            allocator: Mutex::new(allocator),
        }
    }
}

/// Returns a raw pointer to the memory of the given frame.
pub(crate) fn frame_ptr(ppn: PhysPageNum) -> *mut u8 {
    (FRAME_POOL.base + ppn.to_usize() * PAGE_SIZE) as *mut u8
}

/// RAII guard for an allocatable frame.
///
/// Constructing a value of this type will allocate a frame from the frame
/// pool, and the frame will be deallocated when this guard is dropped.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameTracker {
    /// Physical page number of the frame.
    ppn: PhysPageNum,
}

impl FrameTracker {
    /// Allocates a frame.
    ///
    /// The frame's contents are whatever the previous owner left there;
    /// callers that need zeroed memory must clear it themselves.
    ///
    /// # Errors
    /// Returns `ENOMEM` if there are no free frames.
    pub fn build() -> SysResult<Self> {
        FRAME_POOL
            .allocator
            .lock()
            .alloc()
            .map(|i| FrameTracker {
                ppn: PhysPageNum::new(i),
            })
            .ok_or(SysError::ENOMEM)
    }

    /// Gets the physical page number of the frame.
    pub fn ppn(&self) -> PhysPageNum {
        self.ppn
    }

    /// Gets a slice pointing to the frame.
    pub fn as_slice(&self) -> &[u8; PAGE_SIZE] {
        // SAFETY: the frame is allocated, and the returned slice does not
        // outlive the `FrameTracker` which lives as long as the frame.
        unsafe { self.ppn.as_slice() }
    }

    /// Gets a mutable slice pointing to the frame.
    pub fn as_mut_slice(&mut self) -> &mut [u8; PAGE_SIZE] {
        // SAFETY: the frame is allocated, and the returned slice does not
        // outlive the `FrameTracker` which lives as long as the frame.
        unsafe { self.ppn.as_slice_mut() }
    }
}

impl Drop for FrameTracker {
    /// Deallocates the frame.
    fn drop(&mut self) {
        FRAME_POOL.allocator.lock().dealloc(self.ppn.to_usize());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_distinct_frames() {
        let f1 = FrameTracker::build().unwrap();
        assert_ne!(f1.ppn().to_usize(), 0);
        drop(f1);

        let frames: alloc::vec::Vec<_> =
            (0..8).map(|_| FrameTracker::build().unwrap()).collect();
        let mut ppns: alloc::vec::Vec<usize> =
            frames.iter().map(|f| f.ppn().to_usize()).collect();
        ppns.sort_unstable();
        ppns.dedup();
        assert_eq!(ppns.len(), 8);
    }

    #[test]
    fn frame_memory_is_stable() {
        let mut f = FrameTracker::build().unwrap();
        f.as_mut_slice()[0] = 0xA5;
        f.as_mut_slice()[PAGE_SIZE - 1] = 0x5A;
        assert_eq!(f.as_slice()[0], 0xA5);
        assert_eq!(f.as_slice()[PAGE_SIZE - 1], 0x5A);
    }
}
