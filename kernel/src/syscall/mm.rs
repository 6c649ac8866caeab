//! Memory-mapping system calls.

use alloc::sync::Arc;

use systype::{
    error::SyscallResult,
    memory_flags::{MmapFlags, MmapProt},
};

use crate::task::Task;

pub fn sys_mmap(
    task: &Arc<Task>,
    addr: usize,
    length: usize,
    prot: i32,
    flags: i32,
    fd: isize,
    offset: usize,
) -> SyscallResult {
    let flags = MmapFlags::from_bits_truncate(flags);
    let prot = MmapProt::from_bits_truncate(prot);
    log::trace!(
        "[sys_mmap] addr {:#x}, length {:#x}, prot {:?}, flags {:?}, fd {}, offset {:#x}",
        addr,
        length,
        prot,
        flags,
        fd,
        offset
    );

    let mut space = task.addr_space().lock();
    let fd_table = task.fd_table().lock();
    space.mmap(&fd_table, addr, length, prot, flags, fd, offset)
}

pub fn sys_munmap(task: &Arc<Task>, addr: usize, length: usize) -> SyscallResult {
    log::trace!("[sys_munmap] addr {:#x}, length {:#x}", addr, length);
    let mut space = task.addr_space().lock();
    let fd_table = task.fd_table().lock();
    space.munmap(&fd_table, addr, length).map(|_| 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fs::{File, Inode},
        syscall::{syscall, SYS_MMAP, SYS_MUNMAP},
        vm::uaccess,
    };
    use config::mm::{MMAP_START, PAGE_SIZE};

    const ANON: i32 = (MmapFlags::MAP_PRIVATE.bits() | MmapFlags::MAP_ANONYMOUS.bits()) as i32;
    const RW: i32 = (MmapProt::PROT_READ.bits() | MmapProt::PROT_WRITE.bits()) as i32;

    fn args(addr: usize, length: usize, prot: i32, flags: i32, fd: isize, offset: usize) -> [usize; 6] {
        [addr, length, prot as usize, flags as usize, fd as usize, offset]
    }

    #[test]
    fn mmap_syscall_places_in_the_arena() {
        crate::init();
        let task = Task::spawn("sys").unwrap();
        let a = syscall(&task, SYS_MMAP, args(0, 3 * PAGE_SIZE, RW, ANON, -1, 0));
        assert_eq!(a, MMAP_START as isize);

        // Touch through the mapping and release it.
        uaccess::write_user_byte(&task, a as usize, 1).unwrap();
        assert_eq!(
            syscall(&task, SYS_MUNMAP, args(a as usize, 3 * PAGE_SIZE, 0, 0, 0, 0)),
            0
        );
        assert!(task.addr_space().lock().mappings().is_empty());
    }

    #[test]
    fn errors_flatten_to_minus_one() {
        let task = Task::spawn("sys-err").unwrap();
        // Zero length.
        assert_eq!(syscall(&task, SYS_MMAP, args(0, 0, RW, ANON, -1, 0)), -1);
        // Anonymous with a descriptor.
        assert_eq!(
            syscall(&task, SYS_MMAP, args(0, PAGE_SIZE, RW, ANON, 4, 0)),
            -1
        );
        // munmap of an unmapped range.
        assert_eq!(
            syscall(&task, SYS_MUNMAP, args(MMAP_START, PAGE_SIZE, 0, 0, 0, 0)),
            -1
        );
        // Unknown syscall number.
        assert_eq!(syscall(&task, 9999, args(0, 0, 0, 0, 0, 0)), -1);
    }

    #[test]
    fn file_mapping_through_the_syscall_surface() {
        let task = Task::spawn("sys-file").unwrap();
        let inode = Inode::new_regular();
        inode.lock().write_at(0, &[b'M'; 64]).unwrap();
        let fd = task
            .fd_table()
            .lock()
            .alloc_fd(File::new_regular(Arc::clone(&inode), true, true))
            .unwrap();

        let flags = (MmapFlags::MAP_SHARED.bits()) as i32;
        let a = syscall(
            &task,
            SYS_MMAP,
            args(0, PAGE_SIZE, RW, flags, fd as isize, 0),
        );
        assert!(a >= MMAP_START as isize);

        assert_eq!(uaccess::read_user_byte(&task, a as usize).unwrap(), b'M');
        uaccess::write_user_byte(&task, a as usize, b'W').unwrap();
        assert_eq!(
            syscall(&task, SYS_MUNMAP, args(a as usize, PAGE_SIZE, 0, 0, 0, 0)),
            0
        );

        let mut byte = [0u8; 1];
        inode.lock().read_at(0, &mut byte);
        assert_eq!(byte[0], b'W');
    }
}
