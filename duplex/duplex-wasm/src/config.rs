//! Engine limits.

use crate::runtime::memory::MAX_PAGES;

/// Resource bounds applied by instantiation and the execution driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Nested function activations allowed before a call traps.
    pub max_frames: usize,
    /// Operand stack capacity in 32-bit cells, checked on function entry.
    pub max_stack_cells: usize,
    /// Cap on memory size in pages, applied on top of the declared maximum.
    pub max_memory_pages: u32,
    /// Cap on table size in elements, applied on top of the declared maximum.
    pub max_table_elems: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_frames: 4096,
            max_stack_cells: 1 << 20,
            max_memory_pages: MAX_PAGES,
            max_table_elems: 10_000_000,
        }
    }
}
