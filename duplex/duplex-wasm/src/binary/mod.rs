//! Bytecode decoding primitives shared by validation and execution.

pub mod cursor;
pub mod leb128;

use thiserror::Error;

pub use cursor::Cursor;

/// Low-level decoding failure while reading opcodes or immediates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of code at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("LEB128 value does not fit in {bits} bits at offset {offset}")]
    Leb128Overflow { bits: u32, offset: usize },

    #[error("LEB128 encoding too long at offset {offset}")]
    Leb128TooLong { offset: usize },

    #[error("malformed code at offset {offset}: {msg}")]
    Malformed { offset: usize, msg: &'static str },
}

pub type Result<T> = core::result::Result<T, DecodeError>;
