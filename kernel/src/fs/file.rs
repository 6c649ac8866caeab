//! Open files.

use alloc::sync::Arc;

use systype::error::{SysError, SyscallResult};

use super::{inode::Inode, log};

/// An open file: an inode handle plus access mode.
///
/// One `File` may be referenced from several file descriptors (`dup`) and
/// from several processes (fork); it is shared by `Arc`.
#[derive(Debug)]
pub struct File {
    readable: bool,
    writable: bool,
    inode: Arc<Inode>,
}

impl File {
    /// Opens an inode as a regular file.
    pub fn new_regular(inode: Arc<Inode>, readable: bool, writable: bool) -> Arc<Self> {
        Arc::new(File {
            readable,
            writable,
            inode,
        })
    }

    /// Returns the backing inode.
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    pub fn readable(&self) -> bool {
        self.readable
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    /// Reads from the file at the given offset, inside a file-system
    /// transaction with the inode lock held.
    ///
    /// Returns the number of bytes read.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> SyscallResult {
        if !self.readable {
            return Err(SysError::EACCES);
        }
        let _tx = log::begin_op();
        let data = self.inode.lock();
        Ok(data.read_at(offset, buf))
    }

    /// Writes to the file at the given offset, inside a file-system
    /// transaction with the inode lock held.
    ///
    /// Returns the number of bytes written.
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> SyscallResult {
        if !self.writable {
            return Err(SysError::EACCES);
        }
        let _tx = log::begin_op();
        let mut data = self.inode.lock();
        data.write_at(offset, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_mode_is_enforced() {
        let inode = Inode::new_regular();
        let rw = File::new_regular(Arc::clone(&inode), true, true);
        let ro = File::new_regular(Arc::clone(&inode), true, false);

        assert_eq!(rw.write_at(0, b"data"), Ok(4));
        assert_eq!(ro.write_at(0, b"data"), Err(SysError::EACCES));

        let mut buf = [0u8; 4];
        assert_eq!(ro.read_at(0, &mut buf), Ok(4));
        assert_eq!(&buf, b"data");
    }
}
