//! Global variables owned by an instance or handed over by a host.

use thiserror::Error;

use crate::model::{GlobalType, ValType, Value, RESERVED_REF};

/// Rejected host write to a global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GlobalSetError {
    #[error("global is immutable")]
    Immutable,
    #[error("global holds {expected:?}, got {actual:?}")]
    Type { expected: ValType, actual: ValType },
    #[error("reference handle {} is reserved", RESERVED_REF)]
    ReservedReference,
}

#[derive(Debug, Clone)]
pub struct GlobalInstance {
    ty: GlobalType,
    value: Value,
}

impl GlobalInstance {
    pub fn new(ty: GlobalType, init: Value) -> Self {
        Self { ty, value: init }
    }

    pub fn ty(&self) -> &GlobalType {
        &self.ty
    }

    pub fn get(&self) -> Value {
        self.value
    }

    /// Host-side write, checked against the declared type.
    pub fn set(&mut self, value: Value) -> Result<(), GlobalSetError> {
        if !self.ty.mutable {
            return Err(GlobalSetError::Immutable);
        }
        if value.ty() != self.ty.val_type {
            return Err(GlobalSetError::Type { expected: self.ty.val_type, actual: value.ty() });
        }
        if value.uses_reserved_ref() {
            return Err(GlobalSetError::ReservedReference);
        }
        self.value = value;
        Ok(())
    }

    /// Write from validated code, where `global.set` already proved both.
    pub(crate) fn store(&mut self, value: Value) {
        self.value = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_writes_are_checked() {
        let mut g = GlobalInstance::new(GlobalType { val_type: ValType::I64, mutable: true }, Value::I64(1));
        assert_eq!(
            g.set(Value::I32(2)),
            Err(GlobalSetError::Type { expected: ValType::I64, actual: ValType::I32 })
        );
        assert_eq!(g.set(Value::I64(7)), Ok(()));
        assert_eq!(g.get(), Value::I64(7));

        let mut c = GlobalInstance::new(GlobalType { val_type: ValType::F32, mutable: false }, Value::F32(0));
        assert_eq!(c.set(Value::F32(1)), Err(GlobalSetError::Immutable));
        assert_eq!(c.get(), Value::F32(0));

        let mut r = GlobalInstance::new(GlobalType { val_type: ValType::ExternRef, mutable: true }, Value::ExternRef(None));
        assert_eq!(r.set(Value::ExternRef(Some(RESERVED_REF))), Err(GlobalSetError::ReservedReference));
        assert_eq!(r.set(Value::ExternRef(Some(RESERVED_REF - 1))), Ok(()));
    }
}
