//! Virtual memory: address spaces, the per-process mapping table, the page
//! table walker, and the page-fault handler.

pub mod addr_space;
pub mod mem_perm;
pub mod uaccess;

mod mapping;
mod mmap;
mod page_table;
mod pte;

pub use addr_space::AddrSpace;
pub use mapping::{Mapping, MappingTable};
pub use page_table::{tlb_flush_count, PageTable};
pub use pte::{PageTableEntry, PteFlags};
