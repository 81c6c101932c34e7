//! Instruction handlers grouped by family. Every handler serves both modes.

pub(crate) mod control;
pub(crate) mod memory;
pub(crate) mod numeric;
pub(crate) mod parametric;
pub(crate) mod table;
pub(crate) mod variable;
