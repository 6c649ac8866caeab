//! User memory access through the page table.
//!
//! These functions stand in for the MMU: they translate user addresses
//! through the task's page table, and on a miss (or a write to a page
//! mapped read-only) they deliver a page fault to the trap path exactly as
//! the hardware vector would, then retry the access once. A fault the
//! handler rejects has killed the task; the access reports `EFAULT`.

use alloc::sync::Arc;

use config::mm::{PAGE_SIZE, VA_WIDTH};
use mm::address::{PhysAddr, VirtAddr};
use systype::error::{SysError, SysResult};

use crate::{task::Task, trap};

use super::mem_perm::MemPerm;

/// Checks that `[va, va + len)` lies inside the user address space.
fn check_user_range(va: usize, len: usize) -> SysResult<()> {
    va.checked_add(len)
        .filter(|&end| end <= 1 << VA_WIDTH)
        .map(|_| ())
        .ok_or(SysError::EFAULT)
}

/// Translates one user address for the given access type, faulting it in
/// if necessary.
fn resolve(task: &Arc<Task>, va: VirtAddr, access: MemPerm) -> SysResult<PhysAddr> {
    if let Some(pa) = task.addr_space().lock().translate(va, access) {
        return Ok(pa);
    }
    if trap::handle_page_fault(task, va, access) < 0 {
        return Err(SysError::EFAULT);
    }
    task.addr_space()
        .lock()
        .translate(va, access)
        .ok_or(SysError::EFAULT)
}

/// Copies bytes out of the task's user memory.
pub fn copy_from_user(task: &Arc<Task>, va: usize, buf: &mut [u8]) -> SysResult<()> {
    check_user_range(va, buf.len())?;
    let mut copied = 0;
    while copied < buf.len() {
        let cur = VirtAddr::new(va + copied);
        let n = usize::min(PAGE_SIZE - cur.page_offset(), buf.len() - copied);
        let pa = resolve(task, cur, MemPerm::R)?;
        let offset = pa.page_offset();
        // SAFETY: the translation just succeeded, so the frame is resident
        // and owned by the task's address space.
        let frame = unsafe { pa.page_number().as_slice() };
        buf[copied..copied + n].copy_from_slice(&frame[offset..offset + n]);
        copied += n;
    }
    Ok(())
}

/// Copies bytes into the task's user memory.
pub fn copy_to_user(task: &Arc<Task>, va: usize, data: &[u8]) -> SysResult<()> {
    check_user_range(va, data.len())?;
    let mut copied = 0;
    while copied < data.len() {
        let cur = VirtAddr::new(va + copied);
        let n = usize::min(PAGE_SIZE - cur.page_offset(), data.len() - copied);
        let pa = resolve(task, cur, MemPerm::W)?;
        let offset = pa.page_offset();
        // SAFETY: as above; the write stays within the resident frame.
        let frame = unsafe { pa.page_number().as_slice_mut() };
        frame[offset..offset + n].copy_from_slice(&data[copied..copied + n]);
        copied += n;
    }
    Ok(())
}

/// Reads one byte of user memory.
pub fn read_user_byte(task: &Arc<Task>, va: usize) -> SysResult<u8> {
    let mut byte = [0u8; 1];
    copy_from_user(task, va, &mut byte)?;
    Ok(byte[0])
}

/// Writes one byte of user memory.
pub fn write_user_byte(task: &Arc<Task>, va: usize, value: u8) -> SysResult<()> {
    copy_to_user(task, va, &[value])
}
