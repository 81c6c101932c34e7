//! Module instances.
//!
//! An [`Instance`] owns every runtime object its module can reach: imported
//! objects are moved in by the resolver, defined ones are allocated here. A
//! function's address is its index in the module's function space.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::binary::{Cursor, DecodeError};
use crate::config::Config;
use crate::error::{InvokeError, LinkError, Trap, TrapKind};
use crate::host::{HostFunc, ImportResolver};
use crate::model::{
    DataMode, ElemMode, ExportDesc, Expr, FuncAddr, FuncType, ImportDesc, Limits, RefType, Value,
};
use crate::runtime::global::GlobalInstance;
use crate::runtime::memory::MemoryInstance;
use crate::runtime::table::{Ref, TableInstance};
use crate::validate::ValidatedModule;
use crate::vm::exec::ExecContext;
use crate::vm::op;

#[derive(Clone)]
pub enum FuncKind {
    /// Defined in the module; `def_index` indexes its code bodies.
    Wasm { def_index: usize },
    Host(Arc<HostFunc>),
}

#[derive(Clone)]
pub struct FuncInstance {
    pub ty: FuncType,
    pub kind: FuncKind,
}

impl fmt::Debug for FuncInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FuncKind::Wasm { def_index } => f
                .debug_struct("Wasm")
                .field("ty", &self.ty)
                .field("def_index", def_index)
                .finish(),
            FuncKind::Host(_) => f.debug_struct("Host").field("ty", &self.ty).finish(),
        }
    }
}

pub struct Instance {
    module: Arc<ValidatedModule>,
    config: Config,
    pub(crate) funcs: Vec<FuncInstance>,
    pub(crate) tables: Vec<TableInstance>,
    pub(crate) memories: Vec<MemoryInstance>,
    pub(crate) globals: Vec<GlobalInstance>,
    /// Element segment contents; dropped segments are empty.
    pub(crate) elems: Vec<Vec<Ref>>,
    pub(crate) data_dropped: Vec<bool>,
    exports: HashMap<String, ExportDesc>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("funcs", &self.funcs.len())
            .field("tables", &self.tables.len())
            .field("memories", &self.memories.len())
            .field("globals", &self.globals.len())
            .field("exports", &self.exports.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Whether an imported object of current size `size` and maximum `max`
/// satisfies the limits an import declares.
fn limits_match(size: u32, max: Option<u32>, expected: &Limits) -> bool {
    size >= expected.min
        && match expected.max {
            None => true,
            Some(want) => max.is_some_and(|have| have <= want),
        }
}

fn import_mismatch(context: &'static str, expected: impl fmt::Debug, found: impl fmt::Debug) -> LinkError {
    LinkError::TypeMismatch {
        context,
        expected: format!("{expected:?}"),
        found: format!("{found:?}"),
    }
}

impl Instance {
    /// Instantiate `module`: resolve imports, allocate defined objects, apply
    /// active segments, then run the start function.
    #[instrument(skip_all, fields(imports = module.module().imports.len(), funcs = module.module().codes.len()))]
    pub fn new(
        module: Arc<ValidatedModule>,
        resolver: &impl ImportResolver,
        config: &Config,
    ) -> Result<Self, LinkError> {
        let m = module.module();
        let mut inst = Instance {
            module: Arc::clone(&module),
            config: config.clone(),
            funcs: Vec::new(),
            tables: Vec::new(),
            memories: Vec::new(),
            globals: Vec::new(),
            elems: Vec::with_capacity(m.elements.len()),
            data_dropped: vec![false; m.data.len()],
            exports: HashMap::new(),
        };

        /* Imports */
        for imp in &m.imports {
            let unresolved = || LinkError::UnresolvedImport {
                module: imp.module.clone(),
                name: imp.name.clone(),
            };
            match &imp.desc {
                ImportDesc::Func(ti) => {
                    let ty = m.types.get(*ti as usize).ok_or_else(unresolved)?;
                    let f = resolver.resolve_func(&imp.module, &imp.name, ty).ok_or_else(unresolved)?;
                    inst.funcs.push(FuncInstance { ty: ty.clone(), kind: FuncKind::Host(f) });
                }
                ImportDesc::Table(tt) => {
                    let t = resolver.resolve_table(&imp.module, &imp.name, tt).ok_or_else(unresolved)?;
                    if t.elem_type() != tt.elem || !limits_match(t.size(), t.ty().limits.max, &tt.limits) {
                        return Err(import_mismatch("table import", tt, t.ty()));
                    }
                    inst.tables.push(t);
                }
                ImportDesc::Memory(mt) => {
                    let mem = resolver.resolve_memory(&imp.module, &imp.name, mt).ok_or_else(unresolved)?;
                    if !limits_match(mem.size_pages(), mem.ty().limits.max, &mt.limits) {
                        return Err(import_mismatch("memory import", mt, mem.ty()));
                    }
                    inst.memories.push(mem);
                }
                ImportDesc::Global(gt) => {
                    let g = resolver.resolve_global(&imp.module, &imp.name, gt).ok_or_else(unresolved)?;
                    if g.ty() != gt || g.get().ty() != gt.val_type || g.get().uses_reserved_ref() {
                        return Err(import_mismatch("global import", gt, g.ty()));
                    }
                    inst.globals.push(g);
                }
            }
        }

        /* Defined functions, tables, memories */
        for (def_index, &ti) in m.func_type_indices.iter().enumerate() {
            let ty = m
                .types
                .get(ti as usize)
                .cloned()
                .ok_or(LinkError::ConstExpr("function type out of range"))?;
            inst.funcs.push(FuncInstance { ty, kind: FuncKind::Wasm { def_index } });
        }
        for tt in &m.tables {
            let t = TableInstance::new(tt, config.max_table_elems).ok_or(LinkError::Allocation {
                kind: "table",
                min: tt.limits.min,
                limit: config.max_table_elems,
            })?;
            inst.tables.push(t);
        }
        for mt in &m.memories {
            let mem = MemoryInstance::new(mt, config.max_memory_pages).ok_or(LinkError::Allocation {
                kind: "memory",
                min: mt.limits.min,
                limit: config.max_memory_pages,
            })?;
            inst.memories.push(mem);
        }

        /* Globals: each initializer sees the ones before it */
        for g in &m.globals {
            let v = inst.eval_const(&g.init)?;
            if v.ty() != g.ty.val_type {
                return Err(import_mismatch("global initializer", g.ty.val_type, v.ty()));
            }
            inst.globals.push(GlobalInstance::new(g.ty, v));
        }

        /* Element segments: active ones are copied and then dropped */
        for seg in &m.elements {
            let refs = seg
                .init
                .iter()
                .map(|e| inst.eval_const(e).map(|v| v.ref_slot().unwrap_or(None)))
                .collect::<Result<Vec<Ref>, _>>()?;
            match &seg.mode {
                ElemMode::Passive => inst.elems.push(refs),
                ElemMode::Declarative => inst.elems.push(Vec::new()),
                ElemMode::Active { table, offset } => {
                    let at = inst.eval_offset(offset)?;
                    inst.tables
                        .get_mut(*table as usize)
                        .ok_or(LinkError::ElemOutOfBounds)?
                        .init(at, &refs, 0, refs.len() as u32)
                        .map_err(|_| LinkError::ElemOutOfBounds)?;
                    inst.elems.push(Vec::new());
                }
            }
        }

        /* Data segments */
        for (i, seg) in m.data.iter().enumerate() {
            if let DataMode::Active { memory, offset } = &seg.mode {
                let at = inst.eval_offset(offset)?;
                inst.memories
                    .get_mut(*memory as usize)
                    .ok_or(LinkError::DataOutOfBounds)?
                    .init(at, &seg.init, 0, seg.init.len() as u32)
                    .map_err(|_| LinkError::DataOutOfBounds)?;
                inst.data_dropped[i] = true;
            }
        }

        /* Exports */
        for ex in &m.exports {
            inst.exports.insert(ex.name.clone(), ex.desc);
        }

        debug!(
            funcs = inst.funcs.len(),
            tables = inst.tables.len(),
            memories = inst.memories.len(),
            globals = inst.globals.len(),
            "instance allocated"
        );

        if let Some(start) = m.start {
            let outcome = ExecContext::new(&mut inst).invoke(start, &[]);
            match outcome {
                Ok(_) => {}
                Err(InvokeError::Trap(trap)) => return Err(LinkError::StartTrap(trap)),
                Err(other) => {
                    return Err(LinkError::StartTrap(Trap::new(TrapKind::InvalidCode, other.to_string())))
                }
            }
        }
        Ok(inst)
    }

    /// Evaluate a validated constant expression against the globals allocated so far.
    fn eval_const(&self, expr: &Expr) -> Result<Value, LinkError> {
        let malformed = |_: DecodeError| LinkError::ConstExpr("malformed constant expression");
        let mut cur = Cursor::new(&expr.body);
        let value = match cur.read_u8().map_err(malformed)? {
            op::I32_CONST => Value::I32(cur.read_i32().map_err(malformed)?),
            op::I64_CONST => Value::I64(cur.read_i64().map_err(malformed)?),
            op::F32_CONST => Value::F32(cur.read_f32_bits().map_err(malformed)?),
            op::F64_CONST => Value::F64(cur.read_f64_bits().map_err(malformed)?),
            op::GLOBAL_GET => {
                let idx = cur.read_u32().map_err(malformed)?;
                self.globals
                    .get(idx as usize)
                    .map(GlobalInstance::get)
                    .ok_or(LinkError::ConstExpr("global.get of an unknown global"))?
            }
            op::REF_NULL => {
                let byte = cur.read_u8().map_err(malformed)?;
                RefType::from_byte(byte)
                    .ok_or(LinkError::ConstExpr("ref.null of an unknown type"))?
                    .value(None)
            }
            op::REF_FUNC => Value::FuncRef(Some(cur.read_u32().map_err(malformed)?)),
            _ => return Err(LinkError::ConstExpr("instruction not allowed in a constant expression")),
        };
        if cur.read_u8().map_err(malformed)? != op::END || !cur.is_eof() {
            return Err(LinkError::ConstExpr("constant expression must produce exactly one value"));
        }
        Ok(value)
    }

    fn eval_offset(&self, expr: &Expr) -> Result<u32, LinkError> {
        match self.eval_const(expr)? {
            Value::I32(v) => Ok(v as u32),
            _ => Err(LinkError::ConstExpr("segment offset must be i32")),
        }
    }

    pub fn module(&self) -> &Arc<ValidatedModule> {
        &self.module
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn func(&self, addr: FuncAddr) -> Option<&FuncInstance> {
        self.funcs.get(addr as usize)
    }

    pub fn export(&self, name: &str) -> Option<ExportDesc> {
        self.exports.get(name).copied()
    }

    /// Address of the function exported as `name`.
    pub fn exported_func(&self, name: &str) -> Result<FuncAddr, InvokeError> {
        match self.export(name) {
            Some(ExportDesc::Func(addr)) => Ok(addr),
            Some(_) => Err(InvokeError::NotAFunction(name.to_owned())),
            None => Err(InvokeError::ExportNotFound(name.to_owned())),
        }
    }

    /// Call the function exported as `name`.
    pub fn invoke(&mut self, name: &str, args: &[Value]) -> Result<Vec<Value>, InvokeError> {
        let addr = self.exported_func(name)?;
        ExecContext::new(self).invoke(addr, args)
    }

    /// A fresh execution context for driving calls step by step.
    pub fn exec(&mut self) -> ExecContext<'_> {
        ExecContext::new(self)
    }

    pub fn memory(&self, idx: u32) -> Option<&MemoryInstance> {
        self.memories.get(idx as usize)
    }

    pub fn memory_mut(&mut self, idx: u32) -> Option<&mut MemoryInstance> {
        self.memories.get_mut(idx as usize)
    }

    pub fn table(&self, idx: u32) -> Option<&TableInstance> {
        self.tables.get(idx as usize)
    }

    pub fn table_mut(&mut self, idx: u32) -> Option<&mut TableInstance> {
        self.tables.get_mut(idx as usize)
    }

    pub fn global(&self, idx: u32) -> Option<&GlobalInstance> {
        self.globals.get(idx as usize)
    }

    pub fn global_mut(&mut self, idx: u32) -> Option<&mut GlobalInstance> {
        self.globals.get_mut(idx as usize)
    }

    /// Current value of the global exported as `name`.
    pub fn exported_global(&self, name: &str) -> Option<Value> {
        match self.export(name)? {
            ExportDesc::Global(idx) => self.global(idx).map(GlobalInstance::get),
            _ => None,
        }
    }
}
