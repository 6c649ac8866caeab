//! In-memory inodes.
//!
//! An [`Inode`] holds a regular file's contents behind a lock. The lock
//! guard returned by [`Inode::lock`] is the "inode lock" of the file layer:
//! reads and writes of file data happen through the guard, inside a
//! file-system transaction.

use alloc::{sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicU32, Ordering};

use spin::{Mutex, MutexGuard};

use config::vfs::MAX_FILE_SIZE;
use systype::error::{SysError, SysResult};

static NEXT_INO: AtomicU32 = AtomicU32::new(1);

/// An in-memory inode for a regular file.
#[derive(Debug)]
pub struct Inode {
    /// Inode number.
    ino: u32,
    /// File contents, protected by the inode lock.
    data: Mutex<InodeData>,
}

/// File contents of an inode.
#[derive(Debug, Default)]
pub struct InodeData {
    content: Vec<u8>,
}

impl Inode {
    /// Creates an empty regular file.
    pub fn new_regular() -> Arc<Self> {
        Arc::new(Inode {
            ino: NEXT_INO.fetch_add(1, Ordering::Relaxed),
            data: Mutex::new(InodeData::default()),
        })
    }

    /// Returns the inode number.
    pub fn ino(&self) -> u32 {
        self.ino
    }

    /// Acquires the inode lock, giving access to the file contents.
    pub fn lock(&self) -> MutexGuard<'_, InodeData> {
        self.data.lock()
    }
}

impl InodeData {
    /// Returns the size of the file in bytes.
    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// Reads from the file at the given offset.
    ///
    /// Returns the number of bytes read, which is short when the read
    /// reaches the end of the file and zero when `offset` is at or past it.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        if offset >= self.content.len() {
            return 0;
        }
        let n = usize::min(buf.len(), self.content.len() - offset);
        buf[..n].copy_from_slice(&self.content[offset..offset + n]);
        n
    }

    /// Writes to the file at the given offset, extending it as needed. A
    /// gap between the old end of the file and `offset` is zero-filled.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    /// Returns `ENOSPC` if the write would grow the file past
    /// `MAX_FILE_SIZE`.
    pub fn write_at(&mut self, offset: usize, buf: &[u8]) -> SysResult<usize> {
        let end = offset.checked_add(buf.len()).ok_or(SysError::EINVAL)?;
        if end > MAX_FILE_SIZE {
            return Err(SysError::ENOSPC);
        }
        if end > self.content.len() {
            self.content.resize(end, 0);
        }
        self.content[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_read_at_eof() {
        let inode = Inode::new_regular();
        let mut data = inode.lock();
        data.write_at(0, b"hello").unwrap();
        let mut buf = [0xFFu8; 8];
        assert_eq!(data.read_at(0, &mut buf), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(data.read_at(3, &mut buf), 2);
        assert_eq!(data.read_at(5, &mut buf), 0);
        assert_eq!(data.read_at(100, &mut buf), 0);
    }

    #[test]
    fn write_extends_and_zero_fills() {
        let inode = Inode::new_regular();
        let mut data = inode.lock();
        data.write_at(4, b"xy").unwrap();
        assert_eq!(data.size(), 6);
        let mut buf = [0xFFu8; 6];
        data.read_at(0, &mut buf);
        assert_eq!(&buf, &[0, 0, 0, 0, b'x', b'y']);
    }

    #[test]
    fn write_past_limit_is_rejected() {
        let inode = Inode::new_regular();
        let mut data = inode.lock();
        assert_eq!(
            data.write_at(MAX_FILE_SIZE, b"a"),
            Err(SysError::ENOSPC)
        );
        assert_eq!(data.size(), 0);
    }
}
