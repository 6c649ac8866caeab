//! The process control block.

use alloc::{
    string::{String, ToString},
    sync::Arc,
};

use spin::Mutex;

use systype::error::SysResult;

use crate::{fs::FdTable, vm::AddrSpace};

use super::tid::alloc_pid;

/// Scheduling state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Runnable,
    Zombie,
}

/// A process.
///
/// Per-process state is wrapped in locks, but the mapping table and page
/// table are only ever mutated by the owning process from inside its own
/// kernel entry; the locks exist so that `Task` can be shared across the
/// kernel by `Arc`.
#[derive(Debug)]
pub struct Task {
    pid: usize,
    name: String,
    state: Mutex<TaskState>,
    addr_space: Mutex<AddrSpace>,
    fd_table: Mutex<FdTable>,
}

impl Task {
    /// Creates a fresh task with an empty address space and file table.
    ///
    /// # Errors
    /// Returns `ENOMEM` if the page directory cannot be allocated.
    pub fn spawn(name: &str) -> SysResult<Arc<Self>> {
        Ok(Arc::new(Task {
            pid: alloc_pid(),
            name: name.to_string(),
            state: Mutex::new(TaskState::Runnable),
            addr_space: Mutex::new(AddrSpace::build()?),
            fd_table: Mutex::new(FdTable::new()),
        }))
    }

    pub fn pid(&self) -> usize {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    pub fn is_zombie(&self) -> bool {
        self.state() == TaskState::Zombie
    }

    /// Returns the task's address space.
    pub fn addr_space(&self) -> &Mutex<AddrSpace> {
        &self.addr_space
    }

    /// Returns the task's file descriptor table.
    pub fn fd_table(&self) -> &Mutex<FdTable> {
        &self.fd_table
    }

    /// Forks the task.
    ///
    /// The child gets a copy of the user image, shares the parent's open
    /// files, and inherits every mapping descriptor: shared mappings map
    /// the same frames, private mappings are downgraded to copy-on-write
    /// in both address spaces. The child is fully constructed, with all
    /// page table updates done, before it is returned runnable.
    ///
    /// # Errors
    /// Returns `ENOMEM` if memory for the child's address space cannot be
    /// allocated.
    pub fn fork(self: &Arc<Self>) -> SysResult<Arc<Self>> {
        let child_space = self.addr_space.lock().clone_for_fork()?;
        let child_fds = self.fd_table.lock().clone_for_fork();
        let child = Arc::new(Task {
            pid: alloc_pid(),
            name: self.name.clone(),
            state: Mutex::new(TaskState::Runnable),
            addr_space: Mutex::new(child_space),
            fd_table: Mutex::new(child_fds),
        });
        log::debug!("task {} forked child {}", self.pid, child.pid);
        Ok(child)
    }

    /// Terminates the task.
    ///
    /// Open files are closed and the mapping table is cleared before the
    /// task becomes a zombie. Frames and page-table memory are released
    /// when the last reference to the task drops. No file write-back
    /// happens on exit; `munmap` is the write-back point.
    pub fn exit(&self) {
        self.fd_table.lock().close_all();
        self.addr_space.lock().clear_mappings();
        *self.state.lock() = TaskState::Zombie;
        log::debug!("task {} exited", self.pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fs::{File, Inode},
        vm::uaccess,
    };
    use config::mm::PAGE_SIZE;
    use systype::{
        error::SysError,
        memory_flags::{MmapFlags, MmapProt},
    };

    const ANON: MmapFlags = MmapFlags::MAP_PRIVATE.union(MmapFlags::MAP_ANONYMOUS);
    const RW: MmapProt = MmapProt::PROT_READ.union(MmapProt::PROT_WRITE);

    fn mmap_anon(task: &Arc<Task>, length: usize, flags: MmapFlags) -> usize {
        let mut space = task.addr_space().lock();
        let fdt = task.fd_table().lock();
        space.mmap(&fdt, 0, length, RW, flags, -1, 0).unwrap()
    }

    #[test]
    fn fork_gives_the_child_cow_copies_of_private_memory() {
        let parent = Task::spawn("forktest").unwrap();
        let a = mmap_anon(&parent, PAGE_SIZE, ANON);
        uaccess::write_user_byte(&parent, a, 7).unwrap();

        let child = parent.fork().unwrap();
        assert_ne!(child.pid(), parent.pid());

        // The child reads the parent's value, then writes its own; the
        // parent is unaffected.
        assert_eq!(uaccess::read_user_byte(&child, a).unwrap(), 7);
        uaccess::write_user_byte(&child, a, 9).unwrap();
        assert_eq!(uaccess::read_user_byte(&child, a).unwrap(), 9);
        assert_eq!(uaccess::read_user_byte(&parent, a).unwrap(), 7);
    }

    #[test]
    fn fork_shares_the_file_table() {
        let parent = Task::spawn("fdfork").unwrap();
        let inode = Inode::new_regular();
        let fd = parent
            .fd_table()
            .lock()
            .alloc_fd(File::new_regular(inode, true, true))
            .unwrap();

        let child = parent.fork().unwrap();
        let parent_file = parent.fd_table().lock().get(fd).unwrap();
        let child_file = child.fd_table().lock().get(fd).unwrap();
        assert!(Arc::ptr_eq(&parent_file, &child_file));
    }

    #[test]
    fn unmapped_access_kills_the_task() {
        let task = Task::spawn("segfault").unwrap();
        assert_eq!(
            uaccess::read_user_byte(&task, 0x7123_4567),
            Err(SysError::EFAULT)
        );
        assert!(task.is_zombie());
        assert!(crate::console::take_output().contains("Segmentation Fault"));
    }

    #[test]
    fn exit_clears_mappings_and_files() {
        let task = Task::spawn("exit").unwrap();
        let a = mmap_anon(&task, 2 * PAGE_SIZE, ANON);
        uaccess::write_user_byte(&task, a, 3).unwrap();
        let fd = task
            .fd_table()
            .lock()
            .alloc_fd(File::new_regular(Inode::new_regular(), true, true))
            .unwrap();

        task.exit();
        assert!(task.is_zombie());
        assert!(task.addr_space().lock().mappings().is_empty());
        assert!(task.fd_table().lock().get(fd).is_none());
    }
}
