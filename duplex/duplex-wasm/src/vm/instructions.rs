//! Opcode constants, the instruction table, and the single dispatch entry
//! point shared by validation and execution.

pub mod op {
    // Control
    pub const UNREACHABLE: u8 = 0x00;
    pub const NOP: u8 = 0x01;
    pub const BLOCK: u8 = 0x02;
    pub const LOOP: u8 = 0x03;
    pub const IF: u8 = 0x04;
    pub const ELSE: u8 = 0x05;
    pub const END: u8 = 0x0B;
    pub const BR: u8 = 0x0C;
    pub const BR_IF: u8 = 0x0D;
    pub const BR_TABLE: u8 = 0x0E;
    pub const RETURN: u8 = 0x0F;
    pub const CALL: u8 = 0x10;
    pub const CALL_INDIRECT: u8 = 0x11;

    // Parametric
    pub const DROP: u8 = 0x1A;
    pub const SELECT: u8 = 0x1B;
    pub const SELECT_T: u8 = 0x1C;

    // Variables
    pub const LOCAL_GET: u8 = 0x20;
    pub const LOCAL_SET: u8 = 0x21;
    pub const LOCAL_TEE: u8 = 0x22;
    pub const GLOBAL_GET: u8 = 0x23;
    pub const GLOBAL_SET: u8 = 0x24;

    // Table access
    pub const TABLE_GET: u8 = 0x25;
    pub const TABLE_SET: u8 = 0x26;

    // Memory
    pub const I32_LOAD: u8 = 0x28;
    pub const I64_LOAD: u8 = 0x29;
    pub const F32_LOAD: u8 = 0x2A;
    pub const F64_LOAD: u8 = 0x2B;
    pub const I32_LOAD8_S: u8 = 0x2C;
    pub const I32_LOAD8_U: u8 = 0x2D;
    pub const I32_LOAD16_S: u8 = 0x2E;
    pub const I32_LOAD16_U: u8 = 0x2F;
    pub const I64_LOAD8_S: u8 = 0x30;
    pub const I64_LOAD8_U: u8 = 0x31;
    pub const I64_LOAD16_S: u8 = 0x32;
    pub const I64_LOAD16_U: u8 = 0x33;
    pub const I64_LOAD32_S: u8 = 0x34;
    pub const I64_LOAD32_U: u8 = 0x35;
    pub const I32_STORE: u8 = 0x36;
    pub const I64_STORE: u8 = 0x37;
    pub const F32_STORE: u8 = 0x38;
    pub const F64_STORE: u8 = 0x39;
    pub const I32_STORE8: u8 = 0x3A;
    pub const I32_STORE16: u8 = 0x3B;
    pub const I64_STORE8: u8 = 0x3C;
    pub const I64_STORE16: u8 = 0x3D;
    pub const I64_STORE32: u8 = 0x3E;
    pub const MEMORY_SIZE: u8 = 0x3F;
    pub const MEMORY_GROW: u8 = 0x40;

    // Constants
    pub const I32_CONST: u8 = 0x41;
    pub const I64_CONST: u8 = 0x42;
    pub const F32_CONST: u8 = 0x43;
    pub const F64_CONST: u8 = 0x44;

    // Comparisons
    pub const I32_EQZ: u8 = 0x45;
    pub const I32_EQ: u8 = 0x46;
    pub const I32_NE: u8 = 0x47;
    pub const I32_LT_S: u8 = 0x48;
    pub const I32_LT_U: u8 = 0x49;
    pub const I32_GT_S: u8 = 0x4A;
    pub const I32_GT_U: u8 = 0x4B;
    pub const I32_LE_S: u8 = 0x4C;
    pub const I32_LE_U: u8 = 0x4D;
    pub const I32_GE_S: u8 = 0x4E;
    pub const I32_GE_U: u8 = 0x4F;
    pub const I64_EQZ: u8 = 0x50;
    pub const I64_EQ: u8 = 0x51;
    pub const I64_NE: u8 = 0x52;
    pub const I64_LT_S: u8 = 0x53;
    pub const I64_LT_U: u8 = 0x54;
    pub const I64_GT_S: u8 = 0x55;
    pub const I64_GT_U: u8 = 0x56;
    pub const I64_LE_S: u8 = 0x57;
    pub const I64_LE_U: u8 = 0x58;
    pub const I64_GE_S: u8 = 0x59;
    pub const I64_GE_U: u8 = 0x5A;
    pub const F32_EQ: u8 = 0x5B;
    pub const F32_NE: u8 = 0x5C;
    pub const F32_LT: u8 = 0x5D;
    pub const F32_GT: u8 = 0x5E;
    pub const F32_LE: u8 = 0x5F;
    pub const F32_GE: u8 = 0x60;
    pub const F64_EQ: u8 = 0x61;
    pub const F64_NE: u8 = 0x62;
    pub const F64_LT: u8 = 0x63;
    pub const F64_GT: u8 = 0x64;
    pub const F64_LE: u8 = 0x65;
    pub const F64_GE: u8 = 0x66;

    // Integer arithmetic
    pub const I32_CLZ: u8 = 0x67;
    pub const I32_CTZ: u8 = 0x68;
    pub const I32_POPCNT: u8 = 0x69;
    pub const I32_ADD: u8 = 0x6A;
    pub const I32_SUB: u8 = 0x6B;
    pub const I32_MUL: u8 = 0x6C;
    pub const I32_DIV_S: u8 = 0x6D;
    pub const I32_DIV_U: u8 = 0x6E;
    pub const I32_REM_S: u8 = 0x6F;
    pub const I32_REM_U: u8 = 0x70;
    pub const I32_AND: u8 = 0x71;
    pub const I32_OR: u8 = 0x72;
    pub const I32_XOR: u8 = 0x73;
    pub const I32_SHL: u8 = 0x74;
    pub const I32_SHR_S: u8 = 0x75;
    pub const I32_SHR_U: u8 = 0x76;
    pub const I32_ROTL: u8 = 0x77;
    pub const I32_ROTR: u8 = 0x78;
    pub const I64_CLZ: u8 = 0x79;
    pub const I64_CTZ: u8 = 0x7A;
    pub const I64_POPCNT: u8 = 0x7B;
    pub const I64_ADD: u8 = 0x7C;
    pub const I64_SUB: u8 = 0x7D;
    pub const I64_MUL: u8 = 0x7E;
    pub const I64_DIV_S: u8 = 0x7F;
    pub const I64_DIV_U: u8 = 0x80;
    pub const I64_REM_S: u8 = 0x81;
    pub const I64_REM_U: u8 = 0x82;
    pub const I64_AND: u8 = 0x83;
    pub const I64_OR: u8 = 0x84;
    pub const I64_XOR: u8 = 0x85;
    pub const I64_SHL: u8 = 0x86;
    pub const I64_SHR_S: u8 = 0x87;
    pub const I64_SHR_U: u8 = 0x88;
    pub const I64_ROTL: u8 = 0x89;
    pub const I64_ROTR: u8 = 0x8A;

    // Float arithmetic
    pub const F32_ABS: u8 = 0x8B;
    pub const F32_NEG: u8 = 0x8C;
    pub const F32_CEIL: u8 = 0x8D;
    pub const F32_FLOOR: u8 = 0x8E;
    pub const F32_TRUNC: u8 = 0x8F;
    pub const F32_NEAREST: u8 = 0x90;
    pub const F32_SQRT: u8 = 0x91;
    pub const F32_ADD: u8 = 0x92;
    pub const F32_SUB: u8 = 0x93;
    pub const F32_MUL: u8 = 0x94;
    pub const F32_DIV: u8 = 0x95;
    pub const F32_MIN: u8 = 0x96;
    pub const F32_MAX: u8 = 0x97;
    pub const F32_COPYSIGN: u8 = 0x98;
    pub const F64_ABS: u8 = 0x99;
    pub const F64_NEG: u8 = 0x9A;
    pub const F64_CEIL: u8 = 0x9B;
    pub const F64_FLOOR: u8 = 0x9C;
    pub const F64_TRUNC: u8 = 0x9D;
    pub const F64_NEAREST: u8 = 0x9E;
    pub const F64_SQRT: u8 = 0x9F;
    pub const F64_ADD: u8 = 0xA0;
    pub const F64_SUB: u8 = 0xA1;
    pub const F64_MUL: u8 = 0xA2;
    pub const F64_DIV: u8 = 0xA3;
    pub const F64_MIN: u8 = 0xA4;
    pub const F64_MAX: u8 = 0xA5;
    pub const F64_COPYSIGN: u8 = 0xA6;

    // Conversions
    pub const I32_WRAP_I64: u8 = 0xA7;
    pub const I32_TRUNC_F32_S: u8 = 0xA8;
    pub const I32_TRUNC_F32_U: u8 = 0xA9;
    pub const I32_TRUNC_F64_S: u8 = 0xAA;
    pub const I32_TRUNC_F64_U: u8 = 0xAB;
    pub const I64_EXTEND_I32_S: u8 = 0xAC;
    pub const I64_EXTEND_I32_U: u8 = 0xAD;
    pub const I64_TRUNC_F32_S: u8 = 0xAE;
    pub const I64_TRUNC_F32_U: u8 = 0xAF;
    pub const I64_TRUNC_F64_S: u8 = 0xB0;
    pub const I64_TRUNC_F64_U: u8 = 0xB1;
    pub const F32_CONVERT_I32_S: u8 = 0xB2;
    pub const F32_CONVERT_I32_U: u8 = 0xB3;
    pub const F32_CONVERT_I64_S: u8 = 0xB4;
    pub const F32_CONVERT_I64_U: u8 = 0xB5;
    pub const F32_DEMOTE_F64: u8 = 0xB6;
    pub const F64_CONVERT_I32_S: u8 = 0xB7;
    pub const F64_CONVERT_I32_U: u8 = 0xB8;
    pub const F64_CONVERT_I64_S: u8 = 0xB9;
    pub const F64_CONVERT_I64_U: u8 = 0xBA;
    pub const F64_PROMOTE_F32: u8 = 0xBB;
    pub const I32_REINTERPRET_F32: u8 = 0xBC;
    pub const I64_REINTERPRET_F64: u8 = 0xBD;
    pub const F32_REINTERPRET_I32: u8 = 0xBE;
    pub const F64_REINTERPRET_I64: u8 = 0xBF;

    // Sign extension
    pub const I32_EXTEND8_S: u8 = 0xC0;
    pub const I32_EXTEND16_S: u8 = 0xC1;
    pub const I64_EXTEND8_S: u8 = 0xC2;
    pub const I64_EXTEND16_S: u8 = 0xC3;
    pub const I64_EXTEND32_S: u8 = 0xC4;

    // References
    pub const REF_NULL: u8 = 0xD0;
    pub const REF_IS_NULL: u8 = 0xD1;
    pub const REF_FUNC: u8 = 0xD2;

    /// Prefix of the saturating-truncation and bulk memory/table opcodes.
    pub const PREFIX_FC: u8 = 0xFC;

    /// Sub-opcodes following [`PREFIX_FC`], encoded as a LEB128 u32.
    pub mod fc {
        pub const I32_TRUNC_SAT_F32_S: u32 = 0;
        pub const I32_TRUNC_SAT_F32_U: u32 = 1;
        pub const I32_TRUNC_SAT_F64_S: u32 = 2;
        pub const I32_TRUNC_SAT_F64_U: u32 = 3;
        pub const I64_TRUNC_SAT_F32_S: u32 = 4;
        pub const I64_TRUNC_SAT_F32_U: u32 = 5;
        pub const I64_TRUNC_SAT_F64_S: u32 = 6;
        pub const I64_TRUNC_SAT_F64_U: u32 = 7;
        pub const MEMORY_INIT: u32 = 8;
        pub const DATA_DROP: u32 = 9;
        pub const MEMORY_COPY: u32 = 10;
        pub const MEMORY_FILL: u32 = 11;
        pub const TABLE_INIT: u32 = 12;
        pub const ELEM_DROP: u32 = 13;
        pub const TABLE_COPY: u32 = 14;
        pub const TABLE_GROW: u32 = 15;
        pub const TABLE_SIZE: u32 = 16;
        pub const TABLE_FILL: u32 = 17;
    }
}

use crate::binary::Cursor;
use crate::error::CodeError;
use crate::vm::mode::Cx;
use crate::vm::ops::{control, memory, numeric, parametric, table, variable};

/// Shared handler signature: decode immediates from `cur`, then validate or execute.
pub(crate) type Handler = fn(&mut Cx<'_, '_>, &mut Cursor<'_>) -> Result<(), CodeError>;

/// One row of the instruction table.
#[derive(Clone, Copy)]
pub(crate) struct Insn {
    pub name: &'static str,
    pub handler: Handler,
}

macro_rules! instructions {
    ($($code:path => $name:literal $handler:path,)*) => {
        /// Look up a single-byte opcode.
        pub(crate) fn lookup(byte: u8) -> Option<Insn> {
            match byte {
                $($code => Some(Insn { name: $name, handler: $handler }),)*
                _ => None,
            }
        }
    };
}

macro_rules! prefixed_instructions {
    ($($code:path => $name:literal $handler:path,)*) => {
        /// Look up a sub-opcode following [`op::PREFIX_FC`].
        pub(crate) fn lookup_fc(sub: u32) -> Option<Insn> {
            match sub {
                $($code => Some(Insn { name: $name, handler: $handler }),)*
                _ => None,
            }
        }
    };
}

instructions! {
    op::UNREACHABLE => "unreachable" control::unreachable,
    op::NOP => "nop" control::nop,
    op::BLOCK => "block" control::block,
    op::LOOP => "loop" control::loop_,
    op::IF => "if" control::if_,
    op::ELSE => "else" control::else_,
    op::END => "end" control::end,
    op::BR => "br" control::br,
    op::BR_IF => "br_if" control::br_if,
    op::BR_TABLE => "br_table" control::br_table,
    op::RETURN => "return" control::return_,
    op::CALL => "call" control::call,
    op::CALL_INDIRECT => "call_indirect" control::call_indirect,
    op::DROP => "drop" parametric::drop,
    op::SELECT => "select" parametric::select,
    op::SELECT_T => "select" parametric::select_typed,
    op::LOCAL_GET => "local.get" variable::local_get,
    op::LOCAL_SET => "local.set" variable::local_set,
    op::LOCAL_TEE => "local.tee" variable::local_tee,
    op::GLOBAL_GET => "global.get" variable::global_get,
    op::GLOBAL_SET => "global.set" variable::global_set,
    op::TABLE_GET => "table.get" table::table_get,
    op::TABLE_SET => "table.set" table::table_set,
    op::I32_LOAD => "i32.load" memory::i32_load,
    op::I64_LOAD => "i64.load" memory::i64_load,
    op::F32_LOAD => "f32.load" memory::f32_load,
    op::F64_LOAD => "f64.load" memory::f64_load,
    op::I32_LOAD8_S => "i32.load8_s" memory::i32_load8_s,
    op::I32_LOAD8_U => "i32.load8_u" memory::i32_load8_u,
    op::I32_LOAD16_S => "i32.load16_s" memory::i32_load16_s,
    op::I32_LOAD16_U => "i32.load16_u" memory::i32_load16_u,
    op::I64_LOAD8_S => "i64.load8_s" memory::i64_load8_s,
    op::I64_LOAD8_U => "i64.load8_u" memory::i64_load8_u,
    op::I64_LOAD16_S => "i64.load16_s" memory::i64_load16_s,
    op::I64_LOAD16_U => "i64.load16_u" memory::i64_load16_u,
    op::I64_LOAD32_S => "i64.load32_s" memory::i64_load32_s,
    op::I64_LOAD32_U => "i64.load32_u" memory::i64_load32_u,
    op::I32_STORE => "i32.store" memory::i32_store,
    op::I64_STORE => "i64.store" memory::i64_store,
    op::F32_STORE => "f32.store" memory::f32_store,
    op::F64_STORE => "f64.store" memory::f64_store,
    op::I32_STORE8 => "i32.store8" memory::i32_store8,
    op::I32_STORE16 => "i32.store16" memory::i32_store16,
    op::I64_STORE8 => "i64.store8" memory::i64_store8,
    op::I64_STORE16 => "i64.store16" memory::i64_store16,
    op::I64_STORE32 => "i64.store32" memory::i64_store32,
    op::MEMORY_SIZE => "memory.size" memory::memory_size,
    op::MEMORY_GROW => "memory.grow" memory::memory_grow,
    op::I32_CONST => "i32.const" numeric::i32_const,
    op::I64_CONST => "i64.const" numeric::i64_const,
    op::F32_CONST => "f32.const" numeric::f32_const,
    op::F64_CONST => "f64.const" numeric::f64_const,
    op::I32_EQZ => "i32.eqz" numeric::i32_eqz,
    op::I32_EQ => "i32.eq" numeric::i32_eq,
    op::I32_NE => "i32.ne" numeric::i32_ne,
    op::I32_LT_S => "i32.lt_s" numeric::i32_lt_s,
    op::I32_LT_U => "i32.lt_u" numeric::i32_lt_u,
    op::I32_GT_S => "i32.gt_s" numeric::i32_gt_s,
    op::I32_GT_U => "i32.gt_u" numeric::i32_gt_u,
    op::I32_LE_S => "i32.le_s" numeric::i32_le_s,
    op::I32_LE_U => "i32.le_u" numeric::i32_le_u,
    op::I32_GE_S => "i32.ge_s" numeric::i32_ge_s,
    op::I32_GE_U => "i32.ge_u" numeric::i32_ge_u,
    op::I64_EQZ => "i64.eqz" numeric::i64_eqz,
    op::I64_EQ => "i64.eq" numeric::i64_eq,
    op::I64_NE => "i64.ne" numeric::i64_ne,
    op::I64_LT_S => "i64.lt_s" numeric::i64_lt_s,
    op::I64_LT_U => "i64.lt_u" numeric::i64_lt_u,
    op::I64_GT_S => "i64.gt_s" numeric::i64_gt_s,
    op::I64_GT_U => "i64.gt_u" numeric::i64_gt_u,
    op::I64_LE_S => "i64.le_s" numeric::i64_le_s,
    op::I64_LE_U => "i64.le_u" numeric::i64_le_u,
    op::I64_GE_S => "i64.ge_s" numeric::i64_ge_s,
    op::I64_GE_U => "i64.ge_u" numeric::i64_ge_u,
    op::F32_EQ => "f32.eq" numeric::f32_eq,
    op::F32_NE => "f32.ne" numeric::f32_ne,
    op::F32_LT => "f32.lt" numeric::f32_lt,
    op::F32_GT => "f32.gt" numeric::f32_gt,
    op::F32_LE => "f32.le" numeric::f32_le,
    op::F32_GE => "f32.ge" numeric::f32_ge,
    op::F64_EQ => "f64.eq" numeric::f64_eq,
    op::F64_NE => "f64.ne" numeric::f64_ne,
    op::F64_LT => "f64.lt" numeric::f64_lt,
    op::F64_GT => "f64.gt" numeric::f64_gt,
    op::F64_LE => "f64.le" numeric::f64_le,
    op::F64_GE => "f64.ge" numeric::f64_ge,
    op::I32_CLZ => "i32.clz" numeric::i32_clz,
    op::I32_CTZ => "i32.ctz" numeric::i32_ctz,
    op::I32_POPCNT => "i32.popcnt" numeric::i32_popcnt,
    op::I32_ADD => "i32.add" numeric::i32_add,
    op::I32_SUB => "i32.sub" numeric::i32_sub,
    op::I32_MUL => "i32.mul" numeric::i32_mul,
    op::I32_DIV_S => "i32.div_s" numeric::i32_div_s,
    op::I32_DIV_U => "i32.div_u" numeric::i32_div_u,
    op::I32_REM_S => "i32.rem_s" numeric::i32_rem_s,
    op::I32_REM_U => "i32.rem_u" numeric::i32_rem_u,
    op::I32_AND => "i32.and" numeric::i32_and,
    op::I32_OR => "i32.or" numeric::i32_or,
    op::I32_XOR => "i32.xor" numeric::i32_xor,
    op::I32_SHL => "i32.shl" numeric::i32_shl,
    op::I32_SHR_S => "i32.shr_s" numeric::i32_shr_s,
    op::I32_SHR_U => "i32.shr_u" numeric::i32_shr_u,
    op::I32_ROTL => "i32.rotl" numeric::i32_rotl,
    op::I32_ROTR => "i32.rotr" numeric::i32_rotr,
    op::I64_CLZ => "i64.clz" numeric::i64_clz,
    op::I64_CTZ => "i64.ctz" numeric::i64_ctz,
    op::I64_POPCNT => "i64.popcnt" numeric::i64_popcnt,
    op::I64_ADD => "i64.add" numeric::i64_add,
    op::I64_SUB => "i64.sub" numeric::i64_sub,
    op::I64_MUL => "i64.mul" numeric::i64_mul,
    op::I64_DIV_S => "i64.div_s" numeric::i64_div_s,
    op::I64_DIV_U => "i64.div_u" numeric::i64_div_u,
    op::I64_REM_S => "i64.rem_s" numeric::i64_rem_s,
    op::I64_REM_U => "i64.rem_u" numeric::i64_rem_u,
    op::I64_AND => "i64.and" numeric::i64_and,
    op::I64_OR => "i64.or" numeric::i64_or,
    op::I64_XOR => "i64.xor" numeric::i64_xor,
    op::I64_SHL => "i64.shl" numeric::i64_shl,
    op::I64_SHR_S => "i64.shr_s" numeric::i64_shr_s,
    op::I64_SHR_U => "i64.shr_u" numeric::i64_shr_u,
    op::I64_ROTL => "i64.rotl" numeric::i64_rotl,
    op::I64_ROTR => "i64.rotr" numeric::i64_rotr,
    op::F32_ABS => "f32.abs" numeric::f32_abs,
    op::F32_NEG => "f32.neg" numeric::f32_neg,
    op::F32_CEIL => "f32.ceil" numeric::f32_ceil,
    op::F32_FLOOR => "f32.floor" numeric::f32_floor,
    op::F32_TRUNC => "f32.trunc" numeric::f32_trunc,
    op::F32_NEAREST => "f32.nearest" numeric::f32_nearest,
    op::F32_SQRT => "f32.sqrt" numeric::f32_sqrt,
    op::F32_ADD => "f32.add" numeric::f32_add,
    op::F32_SUB => "f32.sub" numeric::f32_sub,
    op::F32_MUL => "f32.mul" numeric::f32_mul,
    op::F32_DIV => "f32.div" numeric::f32_div,
    op::F32_MIN => "f32.min" numeric::f32_min,
    op::F32_MAX => "f32.max" numeric::f32_max,
    op::F32_COPYSIGN => "f32.copysign" numeric::f32_copysign,
    op::F64_ABS => "f64.abs" numeric::f64_abs,
    op::F64_NEG => "f64.neg" numeric::f64_neg,
    op::F64_CEIL => "f64.ceil" numeric::f64_ceil,
    op::F64_FLOOR => "f64.floor" numeric::f64_floor,
    op::F64_TRUNC => "f64.trunc" numeric::f64_trunc,
    op::F64_NEAREST => "f64.nearest" numeric::f64_nearest,
    op::F64_SQRT => "f64.sqrt" numeric::f64_sqrt,
    op::F64_ADD => "f64.add" numeric::f64_add,
    op::F64_SUB => "f64.sub" numeric::f64_sub,
    op::F64_MUL => "f64.mul" numeric::f64_mul,
    op::F64_DIV => "f64.div" numeric::f64_div,
    op::F64_MIN => "f64.min" numeric::f64_min,
    op::F64_MAX => "f64.max" numeric::f64_max,
    op::F64_COPYSIGN => "f64.copysign" numeric::f64_copysign,
    op::I32_WRAP_I64 => "i32.wrap_i64" numeric::i32_wrap_i64,
    op::I32_TRUNC_F32_S => "i32.trunc_f32_s" numeric::i32_trunc_f32_s,
    op::I32_TRUNC_F32_U => "i32.trunc_f32_u" numeric::i32_trunc_f32_u,
    op::I32_TRUNC_F64_S => "i32.trunc_f64_s" numeric::i32_trunc_f64_s,
    op::I32_TRUNC_F64_U => "i32.trunc_f64_u" numeric::i32_trunc_f64_u,
    op::I64_EXTEND_I32_S => "i64.extend_i32_s" numeric::i64_extend_i32_s,
    op::I64_EXTEND_I32_U => "i64.extend_i32_u" numeric::i64_extend_i32_u,
    op::I64_TRUNC_F32_S => "i64.trunc_f32_s" numeric::i64_trunc_f32_s,
    op::I64_TRUNC_F32_U => "i64.trunc_f32_u" numeric::i64_trunc_f32_u,
    op::I64_TRUNC_F64_S => "i64.trunc_f64_s" numeric::i64_trunc_f64_s,
    op::I64_TRUNC_F64_U => "i64.trunc_f64_u" numeric::i64_trunc_f64_u,
    op::F32_CONVERT_I32_S => "f32.convert_i32_s" numeric::f32_convert_i32_s,
    op::F32_CONVERT_I32_U => "f32.convert_i32_u" numeric::f32_convert_i32_u,
    op::F32_CONVERT_I64_S => "f32.convert_i64_s" numeric::f32_convert_i64_s,
    op::F32_CONVERT_I64_U => "f32.convert_i64_u" numeric::f32_convert_i64_u,
    op::F32_DEMOTE_F64 => "f32.demote_f64" numeric::f32_demote_f64,
    op::F64_CONVERT_I32_S => "f64.convert_i32_s" numeric::f64_convert_i32_s,
    op::F64_CONVERT_I32_U => "f64.convert_i32_u" numeric::f64_convert_i32_u,
    op::F64_CONVERT_I64_S => "f64.convert_i64_s" numeric::f64_convert_i64_s,
    op::F64_CONVERT_I64_U => "f64.convert_i64_u" numeric::f64_convert_i64_u,
    op::F64_PROMOTE_F32 => "f64.promote_f32" numeric::f64_promote_f32,
    op::I32_REINTERPRET_F32 => "i32.reinterpret_f32" numeric::i32_reinterpret_f32,
    op::I64_REINTERPRET_F64 => "i64.reinterpret_f64" numeric::i64_reinterpret_f64,
    op::F32_REINTERPRET_I32 => "f32.reinterpret_i32" numeric::f32_reinterpret_i32,
    op::F64_REINTERPRET_I64 => "f64.reinterpret_i64" numeric::f64_reinterpret_i64,
    op::I32_EXTEND8_S => "i32.extend8_s" numeric::i32_extend8_s,
    op::I32_EXTEND16_S => "i32.extend16_s" numeric::i32_extend16_s,
    op::I64_EXTEND8_S => "i64.extend8_s" numeric::i64_extend8_s,
    op::I64_EXTEND16_S => "i64.extend16_s" numeric::i64_extend16_s,
    op::I64_EXTEND32_S => "i64.extend32_s" numeric::i64_extend32_s,
    op::REF_NULL => "ref.null" parametric::ref_null,
    op::REF_IS_NULL => "ref.is_null" parametric::ref_is_null,
    op::REF_FUNC => "ref.func" parametric::ref_func,
}

prefixed_instructions! {
    op::fc::I32_TRUNC_SAT_F32_S => "i32.trunc_sat_f32_s" numeric::i32_trunc_sat_f32_s,
    op::fc::I32_TRUNC_SAT_F32_U => "i32.trunc_sat_f32_u" numeric::i32_trunc_sat_f32_u,
    op::fc::I32_TRUNC_SAT_F64_S => "i32.trunc_sat_f64_s" numeric::i32_trunc_sat_f64_s,
    op::fc::I32_TRUNC_SAT_F64_U => "i32.trunc_sat_f64_u" numeric::i32_trunc_sat_f64_u,
    op::fc::I64_TRUNC_SAT_F32_S => "i64.trunc_sat_f32_s" numeric::i64_trunc_sat_f32_s,
    op::fc::I64_TRUNC_SAT_F32_U => "i64.trunc_sat_f32_u" numeric::i64_trunc_sat_f32_u,
    op::fc::I64_TRUNC_SAT_F64_S => "i64.trunc_sat_f64_s" numeric::i64_trunc_sat_f64_s,
    op::fc::I64_TRUNC_SAT_F64_U => "i64.trunc_sat_f64_u" numeric::i64_trunc_sat_f64_u,
    op::fc::MEMORY_INIT => "memory.init" memory::memory_init,
    op::fc::DATA_DROP => "data.drop" memory::data_drop,
    op::fc::MEMORY_COPY => "memory.copy" memory::memory_copy,
    op::fc::MEMORY_FILL => "memory.fill" memory::memory_fill,
    op::fc::TABLE_INIT => "table.init" table::table_init,
    op::fc::ELEM_DROP => "elem.drop" table::elem_drop,
    op::fc::TABLE_COPY => "table.copy" table::table_copy,
    op::fc::TABLE_GROW => "table.grow" table::table_grow,
    op::fc::TABLE_SIZE => "table.size" table::table_size,
    op::fc::TABLE_FILL => "table.fill" table::table_fill,
}

/// Opcodes admitted in constant expressions.
fn const_allowed(byte: u8) -> bool {
    matches!(
        byte,
        op::I32_CONST
            | op::I64_CONST
            | op::F32_CONST
            | op::F64_CONST
            | op::GLOBAL_GET
            | op::REF_NULL
            | op::REF_FUNC
            | op::END
    )
}

/// Decode the opcode at the cursor and resolve its table entry.
pub(crate) fn decode(cur: &mut Cursor<'_>) -> Result<(u8, Insn), (&'static str, CodeError)> {
    let byte = cur.read_u8().map_err(|e| ("opcode", e.into()))?;
    if byte == op::PREFIX_FC {
        let sub = cur.read_u32().map_err(|e| ("opcode", e.into()))?;
        let insn = lookup_fc(sub).ok_or(("opcode", CodeError::UnknownPrefixedOpcode(sub)))?;
        return Ok((byte, insn));
    }
    let insn = lookup(byte).ok_or(("opcode", CodeError::UnknownOpcode(byte)))?;
    Ok((byte, insn))
}

/// Decode one instruction and run its handler in the mode selected by `cx`.
/// Failures carry the instruction name for diagnostics.
pub(crate) fn dispatch(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), (&'static str, CodeError)> {
    let (byte, insn) = decode(cur)?;
    match cx {
        Cx::Validate(v) if v.const_expr && !const_allowed(byte) => {
            return Err((insn.name, CodeError::NotConstant));
        }
        Cx::Execute(e) => e.opcode = insn.name,
        Cx::Validate(_) => {}
    }
    (insn.handler)(cx, cur).map_err(|err| (insn.name, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_follow_text_format() {
        assert_eq!(lookup(op::I32_ADD).map(|i| i.name), Some("i32.add"));
        assert_eq!(lookup(op::BR_TABLE).map(|i| i.name), Some("br_table"));
        assert_eq!(lookup(op::I64_EXTEND32_S).map(|i| i.name), Some("i64.extend32_s"));
        assert_eq!(lookup_fc(op::fc::TABLE_FILL).map(|i| i.name), Some("table.fill"));
        assert!(lookup(0x06).is_none());
        assert!(lookup(0xC5).is_none());
        assert!(lookup_fc(18).is_none());
    }

    #[test]
    fn decode_reports_unknown_opcodes() {
        let mut cur = Cursor::new(&[0xFF]);
        assert_eq!(decode(&mut cur).err(), Some(("opcode", CodeError::UnknownOpcode(0xFF))));
        let mut cur = Cursor::new(&[op::PREFIX_FC, 0x7F]);
        assert_eq!(decode(&mut cur).err(), Some(("opcode", CodeError::UnknownPrefixedOpcode(0x7F))));
        let mut cur = Cursor::new(&[op::PREFIX_FC, 0x0A, 0x00, 0x00]);
        let (byte, insn) = decode(&mut cur).ok().unwrap();
        assert_eq!((byte, insn.name), (op::PREFIX_FC, "memory.copy"));
        assert_eq!(cur.offset(), 2);
    }
}
