/// Type alias for syscall result. A syscall returns an `usize` if successful.
pub type SyscallResult = Result<usize, SysError>;
/// Type alias for result of general functions.
pub type SysResult<T> = Result<T, SysError>;

/// Linux specific error codes defined in `errno.h`.
// See in "asm-generic/errno-base.h" and "asm-generic/errno.h".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum SysError {
    /// Operation not permitted
    EPERM = 1,
    /// No such file or directory
    ENOENT = 2,
    /// No such process
    ESRCH = 3,
    /// Interrupted system call
    EINTR = 4,
    /// I/O error
    EIO = 5,
    /// No such device or address
    ENXIO = 6,
    /// Bad file number
    EBADF = 9,
    /// Try again
    EAGAIN = 11,
    /// Out of memory
    ENOMEM = 12,
    /// Permission denied
    EACCES = 13,
    /// Bad address
    EFAULT = 14,
    /// Device or resource busy
    EBUSY = 16,
    /// File exists
    EEXIST = 17,
    /// No such device
    ENODEV = 19,
    /// Invalid argument
    EINVAL = 22,
    /// File table overflow
    ENFILE = 23,
    /// Too many open files
    EMFILE = 24,
    /// No space left on device
    ENOSPC = 28,
    /// Invalid system call number
    ENOSYS = 38,
}

impl SysError {
    /// Returns a description of the error.
    pub fn as_str(&self) -> &'static str {
        use SysError::*;
        match self {
            EPERM => "Operation not permitted",
            ENOENT => "No such file or directory",
            ESRCH => "No such process",
            EINTR => "Interrupted system call",
            EIO => "I/O error",
            ENXIO => "No such device or address",
            EBADF => "Bad file number",
            EAGAIN => "Try again",
            ENOMEM => "Out of memory",
            EACCES => "Permission denied",
            EFAULT => "Bad address",
            EBUSY => "Device or resource busy",
            EEXIST => "File exists",
            ENODEV => "No such device",
            EINVAL => "Invalid argument",
            ENFILE => "File table overflow",
            EMFILE => "Too many open files",
            ENOSPC => "No space left on device",
            ENOSYS => "Invalid system call number",
        }
    }

    /// Returns the errno value of the error.
    pub fn code(&self) -> i32 {
        *self as i32
    }
}
