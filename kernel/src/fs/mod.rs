//! The file layer: in-memory inodes, open files, per-process file
//! descriptor tables, and the file-system transaction (log).

pub mod fd_table;
pub mod file;
pub mod inode;
pub mod log;

pub use fd_table::FdTable;
pub use file::File;
pub use inode::Inode;
