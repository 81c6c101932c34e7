//! Label and function frames used by the execution driver.

use crate::model::FuncAddr;
use crate::vm::stack::Cell;

/// Structured construct a label belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Block,
    Loop,
    If,
}

/// An open `block`, `loop` or `if` of the running function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    pub kind: LabelKind,
    /// Operand stack height below the construct's parameters.
    pub height: usize,
    /// Cells a branch to this label carries: results, or parameters for `loop`.
    pub arity: usize,
    /// Where a branch to this label resumes: after `end`, or the loop body start.
    pub continuation: usize,
    /// Where a false `if` condition resumes: after `else`, or the `end` itself.
    pub else_resume: usize,
}

/// One wasm function activation.
#[derive(Debug, Clone)]
pub struct Frame {
    pub func: FuncAddr,
    /// Index of the function among the module's defined functions.
    pub def_index: usize,
    pub locals: Vec<Cell>,
    /// Caller's resume offset.
    pub return_pc: usize,
    /// Label stack depth at entry.
    pub label_base: usize,
    /// Operand stack height at entry, after the arguments moved into `locals`.
    pub height: usize,
    pub result_cells: usize,
}
