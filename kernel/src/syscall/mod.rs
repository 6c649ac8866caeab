//! System call dispatch.
//!
//! Arguments arrive already marshalled from the user register file. Errors
//! are flattened to `-1` at this boundary; the typed error is only logged.

pub mod mm;

use alloc::sync::Arc;

use systype::error::SysError;

use crate::task::Task;

pub const SYS_MUNMAP: usize = 215;
pub const SYS_MMAP: usize = 222;

/// Dispatches a system call for `task`.
pub fn syscall(task: &Arc<Task>, id: usize, args: [usize; 6]) -> isize {
    let result = match id {
        SYS_MMAP => mm::sys_mmap(
            task,
            args[0],
            args[1],
            args[2] as i32,
            args[3] as i32,
            args[4] as isize,
            args[5],
        ),
        SYS_MUNMAP => mm::sys_munmap(task, args[0], args[1]),
        _ => {
            log::warn!("task {}: unsupported syscall {}", task.pid(), id);
            Err(SysError::ENOSYS)
        }
    };
    match result {
        Ok(value) => value as isize,
        Err(e) => {
            log::trace!("task {}: syscall {} failed: {}", task.pid(), id, e.as_str());
            -1
        }
    }
}
