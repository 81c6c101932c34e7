//! Shared builders for integration tests: a bytecode assembler and a
//! module builder producing in-memory modules.
#![allow(dead_code)]

use std::sync::Arc;

use duplex_wasm::model::{
    CodeBody, DataMode, DataSegment, ElemMode, ElementSegment, Export, ExportDesc, Expr, FuncType,
    Global, GlobalType, Import, ImportDesc, Limits, LocalDecl, MemoryType, Module, RefType,
    TableType, ValType,
};
use duplex_wasm::vm::op;
use duplex_wasm::{Config, ImportResolver, Instance, NoImports, ValidatedModule};

pub const EMPTY: u8 = 0x40;
pub const T_I32: u8 = 0x7F;
pub const T_I64: u8 = 0x7E;
pub const T_F32: u8 = 0x7D;
pub const T_F64: u8 = 0x7C;
pub const FUNCREF: u8 = 0x70;
pub const EXTERNREF: u8 = 0x6F;

pub fn uleb(mut v: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn sleb(mut v: i64, out: &mut Vec<u8>) {
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Chained bytecode assembler.
#[derive(Debug, Clone, Default)]
pub struct Asm(Vec<u8>);

impl Asm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, b: u8) -> Self {
        self.0.push(b);
        self
    }

    pub fn ops(mut self, bytes: &[u8]) -> Self {
        self.0.extend_from_slice(bytes);
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        uleb(u64::from(v), &mut self.0);
        self
    }

    /// Opcode followed by one index immediate.
    pub fn idx(self, opcode: u8, i: u32) -> Self {
        self.op(opcode).u32(i)
    }

    pub fn fc(self, sub: u32) -> Self {
        self.op(op::PREFIX_FC).u32(sub)
    }

    pub fn i32_const(mut self, v: i32) -> Self {
        self.0.push(op::I32_CONST);
        sleb(i64::from(v), &mut self.0);
        self
    }

    pub fn i64_const(mut self, v: i64) -> Self {
        self.0.push(op::I64_CONST);
        sleb(v, &mut self.0);
        self
    }

    pub fn f32_const(mut self, v: f32) -> Self {
        self.0.push(op::F32_CONST);
        self.0.extend_from_slice(&v.to_bits().to_le_bytes());
        self
    }

    pub fn f64_const(mut self, v: f64) -> Self {
        self.0.push(op::F64_CONST);
        self.0.extend_from_slice(&v.to_bits().to_le_bytes());
        self
    }

    /// `block`, `loop` or `if` with a single-byte block type.
    pub fn open(self, opcode: u8, bt: u8) -> Self {
        self.op(opcode).op(bt)
    }

    /// `block`, `loop` or `if` typed by a type index.
    pub fn open_typed(mut self, opcode: u8, type_idx: u32) -> Self {
        self.0.push(opcode);
        sleb(i64::from(type_idx), &mut self.0);
        self
    }

    /// Memory access with natural alignment `align` (log2) and `offset`.
    pub fn mem(self, opcode: u8, align: u32, offset: u32) -> Self {
        self.op(opcode).u32(align).u32(offset)
    }

    pub fn br_table(mut self, targets: &[u32], default: u32) -> Self {
        self.0.push(op::BR_TABLE);
        uleb(targets.len() as u64, &mut self.0);
        for &t in targets {
            uleb(u64::from(t), &mut self.0);
        }
        uleb(u64::from(default), &mut self.0);
        self
    }

    pub fn end(self) -> Self {
        self.op(op::END)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn build(self) -> Vec<u8> {
        self.0
    }

    pub fn expr(self) -> Expr {
        Expr::new(&self.end().0)
    }
}

/// Incremental module builder; function indices account for imports.
#[derive(Debug, Clone, Default)]
pub struct ModuleBuilder {
    pub module: Module,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the function type, added when new.
    pub fn ty(&mut self, params: &[ValType], results: &[ValType]) -> u32 {
        let ft = FuncType::new(params, results);
        if let Some(i) = self.module.types.iter().position(|t| *t == ft) {
            return i as u32;
        }
        self.module.types.push(ft);
        (self.module.types.len() - 1) as u32
    }

    pub fn import_func(&mut self, module: &str, name: &str, params: &[ValType], results: &[ValType]) -> u32 {
        let ti = self.ty(params, results);
        self.module.imports.push(Import {
            module: module.into(),
            name: name.into(),
            desc: ImportDesc::Func(ti),
        });
        self.module.imported_funcs() - 1
    }

    pub fn func(&mut self, params: &[ValType], results: &[ValType], locals: &[ValType], body: Asm) -> u32 {
        let ti = self.ty(params, results);
        self.module.func_type_indices.push(ti);
        self.module.codes.push(CodeBody {
            locals: locals.iter().map(|&val_type| LocalDecl { count: 1, val_type }).collect(),
            body: body.end().build(),
        });
        self.module.imported_funcs() + self.module.codes.len() as u32 - 1
    }

    pub fn export(&mut self, name: &str, func: u32) -> &mut Self {
        self.module.exports.push(Export::func(name, func));
        self
    }

    pub fn export_desc(&mut self, name: &str, desc: ExportDesc) -> &mut Self {
        self.module.exports.push(Export { name: name.into(), desc });
        self
    }

    pub fn memory(&mut self, min: u32, max: Option<u32>) -> &mut Self {
        self.module.memories.push(MemoryType::new(Limits::new(min, max)));
        self
    }

    pub fn table(&mut self, elem: RefType, min: u32, max: Option<u32>) -> u32 {
        self.module.tables.push(TableType::new(elem, Limits::new(min, max)));
        (self.module.tables.len() - 1) as u32
    }

    pub fn global(&mut self, val_type: ValType, mutable: bool, init: Asm) -> u32 {
        self.module.globals.push(Global { ty: GlobalType::new(val_type, mutable), init: init.expr() });
        (self.module.globals.len() - 1) as u32
    }

    /// Active funcref segment placing `funcs` at `offset` in `table`.
    pub fn active_elems(&mut self, table: u32, offset: i32, funcs: &[Option<u32>]) -> &mut Self {
        let init = funcs
            .iter()
            .map(|f| match f {
                Some(i) => Asm::new().idx(op::REF_FUNC, *i).expr(),
                None => Asm::new().op(op::REF_NULL).op(FUNCREF).expr(),
            })
            .collect();
        self.module.elements.push(ElementSegment {
            ty: RefType::FuncRef,
            mode: ElemMode::Active { table, offset: Asm::new().i32_const(offset).expr() },
            init,
        });
        self
    }

    pub fn declare_funcs(&mut self, funcs: &[u32]) -> &mut Self {
        let init = funcs.iter().map(|&i| Asm::new().idx(op::REF_FUNC, i).expr()).collect();
        self.module.elements.push(ElementSegment { ty: RefType::FuncRef, mode: ElemMode::Declarative, init });
        self
    }

    pub fn active_data(&mut self, offset: i32, bytes: &[u8]) -> &mut Self {
        self.module.data.push(DataSegment {
            mode: DataMode::Active { memory: 0, offset: Asm::new().i32_const(offset).expr() },
            init: bytes.to_vec(),
        });
        self
    }

    pub fn passive_data(&mut self, bytes: &[u8]) -> &mut Self {
        self.module.data.push(DataSegment { mode: DataMode::Passive, init: bytes.to_vec() });
        self
    }

    pub fn build(&self) -> Module {
        self.module.clone()
    }
}

pub fn validated(m: Module) -> Arc<ValidatedModule> {
    Arc::new(duplex_wasm::validate(m).expect("module should validate"))
}

pub fn instantiate_with(m: Module, resolver: &impl ImportResolver, config: &Config) -> Instance {
    Instance::new(validated(m), resolver, config).expect("module should instantiate")
}

pub fn instantiate(m: Module) -> Instance {
    instantiate_with(m, &NoImports, &Config::default())
}

/// Module exporting one function `f` with the given signature and body.
pub fn single(params: &[ValType], results: &[ValType], locals: &[ValType], body: Asm) -> Module {
    let mut b = ModuleBuilder::new();
    let f = b.func(params, results, locals, body);
    b.export("f", f);
    b.build()
}
