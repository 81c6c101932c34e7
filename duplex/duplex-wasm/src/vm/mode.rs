//! The mode an instruction handler runs in.
//!
//! Handlers receive a [`Cx`] and branch on it: in validation they pop and
//! push value types, in execution they pop and push cells. Operand helpers
//! here cover the common typed cases so both modes consume the same operands.

use crate::error::{CodeError, TrapKind};
use crate::model::ValType;
use crate::runtime::table::Ref;
use crate::validate::ValidationContext;
use crate::vm::exec::ExecContext;
use crate::vm::stack::{cell_to_ref, ref_to_cell, Scalar};

pub(crate) enum Cx<'a, 'm> {
    Validate(&'a mut ValidationContext<'m>),
    Execute(&'a mut ExecContext<'m>),
}

impl Cx<'_, '_> {
    pub(crate) fn is_validating(&self) -> bool {
        matches!(self, Cx::Validate(_))
    }

    /// Pop a numeric operand. Validation checks the type and yields a placeholder.
    pub(crate) fn pop<S: Scalar>(&mut self) -> Result<S, CodeError> {
        match self {
            Cx::Validate(v) => {
                v.pop_valtype(S::TYPE)?;
                Ok(S::default())
            }
            Cx::Execute(e) => e.stack.pop_scalar().ok_or(CodeError::StackUnderflow),
        }
    }

    pub(crate) fn push<S: Scalar>(&mut self, val: S) {
        match self {
            Cx::Validate(v) => v.push_valtype(S::TYPE),
            Cx::Execute(e) => e.stack.push_scalar(val),
        }
    }

    /// Pop a reference of type `ty` (a reference type or `AnyRef`).
    pub(crate) fn pop_ref(&mut self, ty: ValType) -> Result<Ref, CodeError> {
        match self {
            Cx::Validate(v) => {
                v.pop_valtype(ty)?;
                Ok(None)
            }
            Cx::Execute(e) => e.stack.pop().map(cell_to_ref).ok_or(CodeError::StackUnderflow),
        }
    }

    pub(crate) fn push_ref(&mut self, ty: ValType, r: Ref) {
        match self {
            Cx::Validate(v) => v.push_valtype(ty),
            Cx::Execute(e) => e.stack.push(ref_to_cell(r)),
        }
    }

    /// Unary operator: pop `A`, push `f(a)` or trap with the returned kind.
    pub(crate) fn apply1<A, R>(&mut self, f: impl FnOnce(A) -> Result<R, TrapKind>) -> Result<(), CodeError>
    where
        A: Scalar,
        R: Scalar,
    {
        let a = self.pop::<A>()?;
        match self {
            Cx::Validate(v) => {
                v.push_valtype(R::TYPE);
                Ok(())
            }
            Cx::Execute(e) => match f(a) {
                Ok(r) => {
                    e.stack.push_scalar(r);
                    Ok(())
                }
                Err(kind) => e.trap(kind, ""),
            },
        }
    }

    /// Binary operator over two `A` operands, `a` pushed first.
    pub(crate) fn apply2<A, R>(&mut self, f: impl FnOnce(A, A) -> Result<R, TrapKind>) -> Result<(), CodeError>
    where
        A: Scalar,
        R: Scalar,
    {
        let b = self.pop::<A>()?;
        let a = self.pop::<A>()?;
        match self {
            Cx::Validate(v) => {
                v.push_valtype(R::TYPE);
                Ok(())
            }
            Cx::Execute(e) => match f(a, b) {
                Ok(r) => {
                    e.stack.push_scalar(r);
                    Ok(())
                }
                Err(kind) => e.trap(kind, ""),
            },
        }
    }
}
