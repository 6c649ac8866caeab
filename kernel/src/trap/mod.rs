//! The page-fault vector.
//!
//! The simulated MMU in [`crate::vm::uaccess`] calls [`handle_page_fault`]
//! with the faulting virtual address, as the hardware trap handler would.
//! A return of `1` resumes the interrupted access; `-1` means the fault was
//! not resolvable, in which case the faulting task has been terminated with
//! a "Segmentation Fault" diagnostic.

use alloc::sync::Arc;

use mm::address::VirtAddr;

use crate::{
    task::Task,
    vm::mem_perm::MemPerm,
};

/// Dispatches a page fault for `task` at `fault_addr`.
pub fn handle_page_fault(task: &Arc<Task>, fault_addr: VirtAddr, access: MemPerm) -> isize {
    log::trace!(
        "page fault: task {} at {:#x}, access {:?}",
        task.pid(),
        fault_addr.to_usize(),
        access
    );

    let result = {
        let mut space = task.addr_space().lock();
        let fd_table = task.fd_table().lock();
        space.handle_page_fault(&fd_table, fault_addr)
    };

    match result {
        Ok(()) => 1,
        Err(e) => {
            println!("Segmentation Fault");
            log::warn!(
                "task {} killed: page fault at {:#x} ({:?} access) unhandled: {}",
                task.pid(),
                fault_addr.to_usize(),
                access,
                e.as_str()
            );
            task.exit();
            -1
        }
    }
}
