//! The dual-mode instruction set and the execution driver.

pub mod event;
pub mod exec;
pub mod frames;
pub(crate) mod instructions;
pub(crate) mod mode;
mod ops;
pub mod stack;

pub use event::Event;
pub use exec::ExecContext;
pub use instructions::op;
pub use stack::{Cell, NULL_REF};
