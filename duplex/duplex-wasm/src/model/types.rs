//! Value types, runtime values, function/block types, limits, table/memory/global types,
//! import/export descriptors, and index aliases.

use std::fmt;

pub type TypeIdx = u32;
pub type FuncIdx = u32;
pub type TableIdx = u32;
pub type MemIdx = u32;
pub type GlobalIdx = u32;
pub type ElemIdx = u32;
pub type DataIdx = u32;
pub type LocalIdx = u32;

/// Address of a function inside an instance's function space.
pub type FuncAddr = u32;

/// Value type.
///
/// `Unknown` and `AnyRef` never appear in a module; the validator uses them as
/// pop targets. `Unknown` matches any type, `AnyRef` matches any reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValType {
    #[default]
    I32,
    I64,
    F32,
    F64,
    FuncRef,
    ExternRef,
    Unknown,
    AnyRef,
}

impl ValType {
    /// Decode a single-byte value type.
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x7F => ValType::I32,
            0x7E => ValType::I64,
            0x7D => ValType::F32,
            0x7C => ValType::F64,
            0x70 => ValType::FuncRef,
            0x6F => ValType::ExternRef,
            _ => return None,
        })
    }

    pub fn is_num(self) -> bool {
        matches!(self, ValType::I32 | ValType::I64 | ValType::F32 | ValType::F64)
    }

    pub fn is_ref(self) -> bool {
        matches!(self, ValType::FuncRef | ValType::ExternRef)
    }

    /// True for the types a module may declare (everything but the markers).
    pub fn is_concrete(self) -> bool {
        self.is_num() || self.is_ref()
    }

    /// Number of 32-bit cells a value of this type occupies on the execution stack.
    pub fn cells(self) -> usize {
        match self {
            ValType::I64 | ValType::F64 => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
            ValType::FuncRef => "funcref",
            ValType::ExternRef => "externref",
            ValType::Unknown => "unknown",
            ValType::AnyRef => "anyref",
        })
    }
}

/// Reference type of a table or element segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RefType {
    #[default]
    FuncRef,
    ExternRef,
}

impl RefType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x70 => Some(RefType::FuncRef),
            0x6F => Some(RefType::ExternRef),
            _ => None,
        }
    }

    /// Wrap a raw reference slot as a value of this type.
    pub fn value(self, r: Option<u32>) -> Value {
        match self {
            RefType::FuncRef => Value::FuncRef(r),
            RefType::ExternRef => Value::ExternRef(r),
        }
    }
}

impl From<RefType> for ValType {
    fn from(rt: RefType) -> Self {
        match rt {
            RefType::FuncRef => ValType::FuncRef,
            RefType::ExternRef => ValType::ExternRef,
        }
    }
}

/// Reference handle that stack cells use for null; never a live function address or host handle.
pub const RESERVED_REF: u32 = u32::MAX;

/// Runtime value. Floats keep their raw IEEE-754 bits so NaN payloads survive copies.
/// References carry a function address or host handle; `None` is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    FuncRef(Option<FuncAddr>),
    ExternRef(Option<u32>),
}

impl Value {
    pub fn ty(&self) -> ValType {
        match self {
            Value::I32(_) => ValType::I32,
            Value::I64(_) => ValType::I64,
            Value::F32(_) => ValType::F32,
            Value::F64(_) => ValType::F64,
            Value::FuncRef(_) => ValType::FuncRef,
            Value::ExternRef(_) => ValType::ExternRef,
        }
    }

    /// Zero or null value of a type; the markers fall back to `i32` zero / null funcref.
    pub fn default_for(ty: ValType) -> Self {
        match ty {
            ValType::I32 | ValType::Unknown => Value::I32(0),
            ValType::I64 => Value::I64(0),
            ValType::F32 => Value::F32(0),
            ValType::F64 => Value::F64(0),
            ValType::FuncRef | ValType::AnyRef => Value::FuncRef(None),
            ValType::ExternRef => Value::ExternRef(None),
        }
    }

    pub fn from_f32(v: f32) -> Self {
        Value::F32(v.to_bits())
    }

    pub fn from_f64(v: f64) -> Self {
        Value::F64(v.to_bits())
    }

    /// Reference slot of a reference value.
    pub fn ref_slot(&self) -> Option<Option<u32>> {
        match *self {
            Value::FuncRef(r) | Value::ExternRef(r) => Some(r),
            _ => None,
        }
    }

    /// Whether this is a reference carrying [`RESERVED_REF`], which cannot cross into wasm.
    pub fn uses_reserved_ref(&self) -> bool {
        self.ref_slot() == Some(Some(RESERVED_REF))
    }
}

/// Function type: parameter and result types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl FuncType {
    pub fn new(params: &[ValType], results: &[ValType]) -> Self {
        Self { params: params.to_vec(), results: results.to_vec() }
    }
}

/// Block signature immediate of `block`, `loop` and `if`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValType),
    Func(TypeIdx),
}

impl BlockType {
    /// Interpret a signed 33-bit block type immediate.
    pub fn from_s33(raw: i64) -> Option<Self> {
        match raw {
            -64 => Some(BlockType::Empty),
            r if r < 0 => {
                // single-byte encodings are the low 7 bits of a negative s33
                ValType::from_byte((r & 0x7F) as u8).map(BlockType::Value)
            }
            r => u32::try_from(r).ok().map(BlockType::Func),
        }
    }
}

/// Min/max limits (elements for tables, 64 KiB pages for memories).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

impl Limits {
    pub const fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableType {
    pub elem: RefType,
    pub limits: Limits,
}

impl TableType {
    pub const fn new(elem: RefType, limits: Limits) -> Self {
        Self { elem, limits }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryType {
    pub limits: Limits,
}

impl MemoryType {
    pub const fn new(limits: Limits) -> Self {
        Self { limits }
    }
}

/// Global type with content value type and mutability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub val_type: ValType,
    pub mutable: bool,
}

impl GlobalType {
    pub const fn new(val_type: ValType, mutable: bool) -> Self {
        Self { val_type, mutable }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDesc {
    Func(TypeIdx),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportDesc {
    Func(FuncIdx),
    Table(TableIdx),
    Memory(MemIdx),
    Global(GlobalIdx),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub desc: ExportDesc,
}

impl Export {
    pub fn func(name: impl Into<String>, idx: FuncIdx) -> Self {
        Self { name: name.into(), desc: ExportDesc::Func(idx) }
    }
}
