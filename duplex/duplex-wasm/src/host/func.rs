use crate::error::Trap;
use crate::model::Value;

/// Host function callable from wasm. The engine checks the returned values
/// against the import's declared result types.
pub type HostFunc = dyn Fn(&[Value]) -> Result<Vec<Value>, Trap> + Send + Sync;
