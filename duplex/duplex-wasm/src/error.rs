//! Crate-level error types: validation failures, traps, link and invoke errors.

use thiserror::Error;

use crate::binary::DecodeError;
use crate::model::ValType;

/// Why a single instruction failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("unknown opcode 0xfc {0}")]
    UnknownPrefixedOpcode(u32),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ValType, found: ValType },

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("type mismatch: {0} values remaining at end of block")]
    ValuesRemaining(usize),

    #[error("unknown label {0}")]
    UnknownLabel(u32),

    #[error("br_table arity mismatch: default carries {default} values, target carries {target}")]
    BrTableArity { default: usize, target: usize },

    #[error("else without matching if")]
    ElseWithoutIf,

    #[error("unknown {space} {index}")]
    UnknownIndex { space: &'static str, index: u32 },

    #[error("global {0} is immutable")]
    ImmutableGlobal(u32),

    #[error("constant expression reads mutable global {0}")]
    MutableGlobalInConst(u32),

    #[error("undeclared function reference {0}")]
    UndeclaredFuncRef(u32),

    #[error("invalid {0} immediate")]
    BadImmediate(&'static str),

    #[error("alignment must not be larger than natural")]
    BadAlignment,

    #[error("{0} requires a data count section")]
    DataCountRequired(&'static str),

    #[error("type mismatch: {0}")]
    Mismatch(&'static str),

    #[error("instruction not allowed in a constant expression")]
    NotConstant,

    #[error("no type annotation recorded at offset {0}")]
    MissingAnnotation(usize),

    #[error("no jump slot recorded for block at offset {0}")]
    MissingJump(usize),

    #[error("unexpected end of code")]
    UnexpectedEnd,

    #[error("trailing bytes after final end")]
    TrailingBytes,

    #[error("no active function frame")]
    NoActiveFrame,
}

/// Module rejected by validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("function {func}: {opcode} at offset {offset}: {reason}")]
    Code {
        func: u32,
        offset: usize,
        opcode: &'static str,
        reason: CodeError,
    },

    #[error("constant expression ({context}): {reason}")]
    ConstExpr {
        context: &'static str,
        reason: CodeError,
    },

    #[error("invalid module: {0}")]
    Module(&'static str),

    #[error("{space} index {index} out of range")]
    IndexOutOfRange { space: &'static str, index: u32 },
}

/// Category of a runtime trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum TrapKind {
    #[error("unreachable")]
    Unreachable,
    #[error("integer divide by zero")]
    IntegerDivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversion,
    #[error("out of bounds memory access")]
    OutOfBoundsMemory,
    #[error("out of bounds table access")]
    OutOfBoundsTable,
    #[error("null reference")]
    NullReference,
    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,
    #[error("call stack exhausted")]
    CallStackExhausted,
    #[error("interrupted")]
    Interrupted,
    #[error("invalid code")]
    InvalidCode,
    #[error("host function failed")]
    Host,
}

/// A runtime trap: its category plus formatted context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Trap {
    pub kind: TrapKind,
    pub message: String,
}

impl Trap {
    pub fn new(kind: TrapKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("unresolved import: {module}.{name}")]
    UnresolvedImport { module: String, name: String },

    #[error("type mismatch ({context}): expected {expected}, found {found}")]
    TypeMismatch {
        context: &'static str,
        expected: String,
        found: String,
    },

    #[error("invalid constant expression ({0})")]
    ConstExpr(&'static str),

    #[error("cannot allocate {kind} of initial size {min} (cap {limit})")]
    Allocation { kind: &'static str, min: u32, limit: u32 },

    #[error("element segment initialization out of bounds")]
    ElemOutOfBounds,

    #[error("data segment initialization out of bounds")]
    DataOutOfBounds,

    #[error("trap while running start function")]
    StartTrap(#[source] Trap),
}

/// Failure to invoke an exported function.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("export {0} not found")]
    ExportNotFound(String),

    #[error("export {0} is not a function")]
    NotAFunction(String),

    #[error("function {func} expects {expected} arguments, got {found}")]
    ArgumentCount { func: u32, expected: usize, found: usize },

    #[error("argument {index}: expected {expected}, found {found}")]
    ArgumentType {
        index: usize,
        expected: ValType,
        found: ValType,
    },

    #[error("argument {index}: reference handle {} is reserved", crate::model::RESERVED_REF)]
    ReservedReference { index: usize },

    #[error("function {0} not found")]
    UnknownFunction(u32),

    #[error(transparent)]
    Trap(#[from] Trap),
}
