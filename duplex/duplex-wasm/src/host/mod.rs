//! Import resolution and host functions.

pub mod func;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Trap;
use crate::model::{FuncType, GlobalType, MemoryType, TableType, Value};
use crate::runtime::{GlobalInstance, MemoryInstance, TableInstance};
pub use func::HostFunc;

/// Supplies the imports of a module being instantiated.
///
/// Functions are shared host callables. Tables, memories and globals are
/// handed over as owned instances; the default implementations leave them
/// unresolved.
pub trait ImportResolver {
    fn resolve_func(&self, module: &str, name: &str, ty: &FuncType) -> Option<Arc<HostFunc>>;

    fn resolve_table(&self, _module: &str, _name: &str, _ty: &TableType) -> Option<TableInstance> {
        None
    }

    fn resolve_memory(&self, _module: &str, _name: &str, _ty: &MemoryType) -> Option<MemoryInstance> {
        None
    }

    fn resolve_global(&self, _module: &str, _name: &str, _ty: &GlobalType) -> Option<GlobalInstance> {
        None
    }
}

/// Resolver for modules without imports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImports;

impl ImportResolver for NoImports {
    fn resolve_func(&self, _module: &str, _name: &str, _ty: &FuncType) -> Option<Arc<HostFunc>> {
        None
    }
}

/// Host functions registered by `(module, name)` with their signatures.
/// An import resolves only when its declared type equals the registered one.
#[derive(Clone, Default)]
pub struct HostFuncs {
    funcs: HashMap<(String, String), (FuncType, Arc<HostFunc>)>,
}

impl HostFuncs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define<F>(&mut self, module: &str, name: &str, ty: FuncType, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Vec<Value>, Trap> + Send + Sync + 'static,
    {
        self.funcs.insert((module.to_owned(), name.to_owned()), (ty, Arc::new(f)));
        self
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

impl fmt::Debug for HostFuncs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.funcs.keys().map(|(m, n)| format!("{m}.{n}")))
            .finish()
    }
}

impl ImportResolver for HostFuncs {
    fn resolve_func(&self, module: &str, name: &str, ty: &FuncType) -> Option<Arc<HostFunc>> {
        let (declared, f) = self.funcs.get(&(module.to_owned(), name.to_owned()))?;
        (declared == ty).then(|| Arc::clone(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValType;

    #[test]
    fn host_funcs_resolve_by_name_and_type() {
        let sig = FuncType::new(&[ValType::I32], &[ValType::I32]);
        let mut host = HostFuncs::new();
        host.define("env", "double", sig.clone(), |args| match args {
            [Value::I32(x)] => Ok(vec![Value::I32(x * 2)]),
            _ => Ok(vec![]),
        });
        let f = host.resolve_func("env", "double", &sig).unwrap();
        assert_eq!(f(&[Value::I32(21)]), Ok(vec![Value::I32(42)]));
        assert!(host.resolve_func("env", "double", &FuncType::default()).is_none());
        assert!(host.resolve_func("env", "triple", &sig).is_none());
        assert!(NoImports.resolve_table("env", "t", &TableType::default()).is_none());
    }
}
