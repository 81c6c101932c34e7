//! Runtime instances: memories, tables, globals and the module instance owning them.

pub mod global;
pub mod instance;
pub mod memory;
pub mod table;

pub use global::{GlobalInstance, GlobalSetError};
pub use instance::{FuncInstance, FuncKind, Instance};
pub use memory::{MemoryInstance, MAX_PAGES, PAGE_SIZE};
pub use table::{Ref, TableInstance};
