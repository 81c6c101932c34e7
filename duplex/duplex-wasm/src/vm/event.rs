//! Control transfer requested by an executed instruction.

use crate::error::Trap;
use crate::model::FuncAddr;

/// What the driver must do before the next instruction is dispatched.
/// Instructions that simply fall through produce no event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Unwind `level` labels of the current frame and resume at the target's
    /// continuation. `goto_else` resumes the innermost `if` at its else arm instead.
    /// A level equal to the number of open labels is a function return.
    Branch { level: u32, goto_else: bool },
    /// Activate `callee`; arguments are on the operand stack.
    Call { callee: FuncAddr },
    Trap(Trap),
}

impl Event {
    pub(crate) fn branch(level: u32) -> Self {
        Event::Branch { level, goto_else: false }
    }
}
