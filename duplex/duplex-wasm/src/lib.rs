//! duplex-wasm: a WebAssembly validator and interpreter built on one
//! instruction set that runs in two modes.
//!
//! Every opcode has a single handler. Run over a function body with a
//! validation context it type-checks the code and records the side tables
//! execution needs; run with an execution context it computes values and
//! reports control transfer as an [`vm::Event`] for the driver loop.

pub mod binary;
pub mod config;
pub mod error;
pub mod host;
pub mod model;
pub mod runtime;
pub mod validate;
pub mod vm;

use std::sync::Arc;

pub use config::Config;
pub use error::{CodeError, InvokeError, LinkError, Trap, TrapKind, ValidationError};
pub use host::{HostFunc, HostFuncs, ImportResolver, NoImports};
pub use model::{FuncType, Module, ValType, Value};
pub use runtime::Instance;
pub use validate::ValidatedModule;
pub use vm::{Event, ExecContext};

/// Validate an in-memory module.
pub fn validate(module: Module) -> Result<ValidatedModule, ValidationError> {
    validate::validate_module(module)
}

/// Instantiate a validated module with the default [`Config`].
pub fn instantiate(
    module: Arc<ValidatedModule>,
    resolver: &impl ImportResolver,
) -> Result<Instance, LinkError> {
    Instance::new(module, resolver, &Config::default())
}

/// Invoke an exported function.
pub fn invoke_export(
    instance: &mut Instance,
    export_name: &str,
    args: &[Value],
) -> Result<Vec<Value>, InvokeError> {
    instance.invoke(export_name, args)
}
