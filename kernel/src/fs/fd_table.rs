//! Per-process file descriptor tables.

use alloc::{sync::Arc, vec, vec::Vec};

use config::process::NOFILE;
use systype::error::{SysError, SysResult};

use super::file::File;

/// A per-process table of open files, indexed by file descriptor.
#[derive(Debug)]
pub struct FdTable {
    files: Vec<Option<Arc<File>>>,
}

impl FdTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        FdTable {
            files: vec![None; NOFILE],
        }
    }

    /// Installs a file in the lowest free slot and returns its descriptor.
    ///
    /// # Errors
    /// Returns `EMFILE` if every slot is taken.
    pub fn alloc_fd(&mut self, file: Arc<File>) -> SysResult<usize> {
        let fd = self
            .files
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(SysError::EMFILE)?;
        self.files[fd] = Some(file);
        Ok(fd)
    }

    /// Returns the file open at the given descriptor.
    pub fn get(&self, fd: usize) -> Option<Arc<File>> {
        self.files.get(fd).and_then(|slot| slot.clone())
    }

    /// Duplicates a descriptor: the new descriptor refers to the same open
    /// file.
    ///
    /// # Errors
    /// Returns `EBADF` if `fd` is not open, `EMFILE` if the table is full.
    pub fn dup(&mut self, fd: usize) -> SysResult<usize> {
        let file = self.get(fd).ok_or(SysError::EBADF)?;
        self.alloc_fd(file)
    }

    /// Closes a descriptor.
    ///
    /// # Errors
    /// Returns `EBADF` if `fd` is not open.
    pub fn close(&mut self, fd: usize) -> SysResult<()> {
        match self.files.get_mut(fd) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(SysError::EBADF),
        }
    }

    /// Closes every descriptor. Used at process exit.
    pub fn close_all(&mut self) {
        self.files.iter_mut().for_each(|slot| *slot = None);
    }

    /// Clones the table for a forked child: every descriptor refers to the
    /// same open files as the parent's.
    pub fn clone_for_fork(&self) -> Self {
        FdTable {
            files: self.files.clone(),
        }
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::inode::Inode;

    #[test]
    fn descriptors_are_lowest_free() {
        let mut table = FdTable::new();
        let file = File::new_regular(Inode::new_regular(), true, true);
        assert_eq!(table.alloc_fd(Arc::clone(&file)).unwrap(), 0);
        assert_eq!(table.alloc_fd(Arc::clone(&file)).unwrap(), 1);
        table.close(0).unwrap();
        assert_eq!(table.alloc_fd(Arc::clone(&file)).unwrap(), 0);
    }

    #[test]
    fn dup_shares_the_open_file() {
        let mut table = FdTable::new();
        let file = File::new_regular(Inode::new_regular(), true, true);
        let fd = table.alloc_fd(file).unwrap();
        let fd2 = table.dup(fd).unwrap();
        assert_ne!(fd, fd2);
        let a = table.get(fd).unwrap();
        let b = table.get(fd2).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.dup(NOFILE + 1), Err(SysError::EBADF));
    }

    #[test]
    fn table_capacity_is_bounded() {
        let mut table = FdTable::new();
        let file = File::new_regular(Inode::new_regular(), true, true);
        for _ in 0..NOFILE {
            table.alloc_fd(Arc::clone(&file)).unwrap();
        }
        assert_eq!(table.alloc_fd(file), Err(SysError::EMFILE));
    }
}
