mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::*;
use duplex_wasm::model::{
    ElemMode, ElementSegment, ExportDesc, GlobalType, Import, ImportDesc, Limits, MemoryType, RefType,
    RESERVED_REF,
};
use duplex_wasm::runtime::{GlobalInstance, MemoryInstance, Ref, MAX_PAGES, PAGE_SIZE};
use duplex_wasm::vm::op;
use duplex_wasm::{
    Config, FuncType, HostFunc, HostFuncs, ImportResolver, Instance, InvokeError, LinkError, Module,
    NoImports, Trap, TrapKind, ValType, Value,
};

use ValType::{ExternRef, FuncRef, F32, F64, I32, I64};

fn trap_of(r: Result<Vec<Value>, InvokeError>) -> Trap {
    match r {
        Err(InvokeError::Trap(t)) => t,
        other => panic!("expected a trap, got {other:?}"),
    }
}

fn kind_of(r: Result<Vec<Value>, InvokeError>) -> TrapKind {
    trap_of(r).kind
}

fn binop(t: ValType, opcode: u8) -> Module {
    single(&[t, t], &[t], &[], Asm::new().idx(op::LOCAL_GET, 0).idx(op::LOCAL_GET, 1).op(opcode))
}

fn link(m: Module, resolver: &impl ImportResolver) -> Result<Instance, LinkError> {
    Instance::new(validated(m), resolver, &Config::default())
}

// Golden: MIN / -1 overflows, division by zero traps, MIN % -1 is 0.
#[test]
fn golden_signed_division_traps() {
    let mut div = instantiate(binop(I32, op::I32_DIV_S));
    let t = trap_of(div.invoke("f", &[Value::I32(i32::MIN), Value::I32(-1)]));
    assert_eq!(t.kind, TrapKind::IntegerOverflow);
    assert_eq!(t.message, "i32.div_s");
    assert_eq!(kind_of(div.invoke("f", &[Value::I32(7), Value::I32(0)])), TrapKind::IntegerDivideByZero);
    assert_eq!(div.invoke("f", &[Value::I32(-7), Value::I32(2)]).unwrap(), vec![Value::I32(-3)]);

    let mut rem = instantiate(binop(I32, op::I32_REM_S));
    assert_eq!(rem.invoke("f", &[Value::I32(i32::MIN), Value::I32(-1)]).unwrap(), vec![Value::I32(0)]);
    assert_eq!(rem.invoke("f", &[Value::I32(-7), Value::I32(2)]).unwrap(), vec![Value::I32(-1)]);
    assert_eq!(kind_of(rem.invoke("f", &[Value::I32(1), Value::I32(0)])), TrapKind::IntegerDivideByZero);

    let mut div64 = instantiate(binop(I64, op::I64_DIV_S));
    assert_eq!(
        kind_of(div64.invoke("f", &[Value::I64(i64::MIN), Value::I64(-1)])),
        TrapKind::IntegerOverflow
    );
    assert_eq!(div64.invoke("f", &[Value::I64(1 << 40), Value::I64(-2)]).unwrap(), vec![Value::I64(-(1 << 39))]);

    let mut divu = instantiate(binop(I32, op::I32_DIV_U));
    assert_eq!(kind_of(divu.invoke("f", &[Value::I32(1), Value::I32(0)])), TrapKind::IntegerDivideByZero);
    assert_eq!(divu.invoke("f", &[Value::I32(-1), Value::I32(2)]).unwrap(), vec![Value::I32(i32::MAX)]);
}

// Golden: trunc traps on NaN and out-of-range inputs; trunc_sat clamps them.
#[test]
fn golden_truncation_traps_where_saturation_clamps() {
    let mut b = ModuleBuilder::new();
    let conversions: [(&str, ValType, ValType, Asm); 6] = [
        ("trunc_s", F32, I32, Asm::new().op(op::I32_TRUNC_F32_S)),
        ("sat_s", F32, I32, Asm::new().fc(op::fc::I32_TRUNC_SAT_F32_S)),
        ("trunc_u", F64, I32, Asm::new().op(op::I32_TRUNC_F64_U)),
        ("sat_u", F64, I32, Asm::new().fc(op::fc::I32_TRUNC_SAT_F64_U)),
        ("trunc64", F64, I64, Asm::new().op(op::I64_TRUNC_F64_S)),
        ("sat64", F64, I64, Asm::new().fc(op::fc::I64_TRUNC_SAT_F64_S)),
    ];
    for (name, from, to, conv) in conversions {
        let f = b.func(&[from], &[to], &[], Asm::new().idx(op::LOCAL_GET, 0).ops(&conv.build()));
        b.export(name, f);
    }
    let mut inst = instantiate(b.build());
    let f32v = |v: f32| [Value::from_f32(v)];
    let f64v = |v: f64| [Value::from_f64(v)];

    let t = trap_of(inst.invoke("trunc_s", &f32v(f32::NAN)));
    assert_eq!(t.kind, TrapKind::InvalidConversion);
    assert_eq!(t.message, "i32.trunc_f32_s");
    assert_eq!(kind_of(inst.invoke("trunc_s", &f32v(f32::INFINITY))), TrapKind::IntegerOverflow);
    assert_eq!(kind_of(inst.invoke("trunc_s", &f32v(2147483648.0))), TrapKind::IntegerOverflow);
    assert_eq!(inst.invoke("trunc_s", &f32v(-3.7)).unwrap(), vec![Value::I32(-3)]);

    assert_eq!(inst.invoke("sat_s", &f32v(f32::NAN)).unwrap(), vec![Value::I32(0)]);
    assert_eq!(inst.invoke("sat_s", &f32v(f32::INFINITY)).unwrap(), vec![Value::I32(i32::MAX)]);
    assert_eq!(inst.invoke("sat_s", &f32v(f32::NEG_INFINITY)).unwrap(), vec![Value::I32(i32::MIN)]);
    assert_eq!(inst.invoke("sat_s", &f32v(-3.7)).unwrap(), vec![Value::I32(-3)]);

    assert_eq!(inst.invoke("trunc_u", &f64v(-0.9)).unwrap(), vec![Value::I32(0)]);
    assert_eq!(kind_of(inst.invoke("trunc_u", &f64v(-1.0))), TrapKind::IntegerOverflow);
    assert_eq!(inst.invoke("trunc_u", &f64v(4294967295.5)).unwrap(), vec![Value::I32(-1)]);
    assert_eq!(inst.invoke("sat_u", &f64v(-5.0)).unwrap(), vec![Value::I32(0)]);
    assert_eq!(inst.invoke("sat_u", &f64v(5e9)).unwrap(), vec![Value::I32(-1)]);

    assert_eq!(kind_of(inst.invoke("trunc64", &f64v(f64::NAN))), TrapKind::InvalidConversion);
    assert_eq!(kind_of(inst.invoke("trunc64", &f64v(9.3e18))), TrapKind::IntegerOverflow);
    assert_eq!(inst.invoke("sat64", &f64v(1e300)).unwrap(), vec![Value::I64(i64::MAX)]);
    assert_eq!(inst.invoke("sat64", &f64v(-1e300)).unwrap(), vec![Value::I64(i64::MIN)]);
}

fn memory_module(min: u32, max: Option<u32>) -> Module {
    let mut b = ModuleBuilder::new();
    b.memory(min, max);
    let grow = b.func(&[I32], &[I32], &[], Asm::new().idx(op::LOCAL_GET, 0).op(op::MEMORY_GROW).op(0));
    let size = b.func(&[], &[I32], &[], Asm::new().op(op::MEMORY_SIZE).op(0));
    let load = b.func(&[I32], &[I32], &[], Asm::new().idx(op::LOCAL_GET, 0).mem(op::I32_LOAD, 2, 0));
    b.export("grow", grow).export("size", size).export("load", load);
    b.build()
}

// Golden: growing past the maximum yields -1 and bounds stay where they were.
#[test]
fn golden_memory_grow_failure_leaves_memory_unchanged() {
    let mut inst = instantiate(memory_module(1, Some(2)));
    let page = PAGE_SIZE as i32;
    assert_eq!(inst.invoke("load", &[Value::I32(page - 4)]).unwrap(), vec![Value::I32(0)]);
    assert_eq!(kind_of(inst.invoke("load", &[Value::I32(page - 3)])), TrapKind::OutOfBoundsMemory);

    assert_eq!(inst.invoke("grow", &[Value::I32(1)]).unwrap(), vec![Value::I32(1)]);
    assert_eq!(inst.invoke("load", &[Value::I32(2 * page - 4)]).unwrap(), vec![Value::I32(0)]);

    assert_eq!(inst.invoke("grow", &[Value::I32(1)]).unwrap(), vec![Value::I32(-1)]);
    assert_eq!(inst.invoke("grow", &[Value::I32(-1)]).unwrap(), vec![Value::I32(-1)]);
    assert_eq!(inst.invoke("size", &[]).unwrap(), vec![Value::I32(2)]);
    assert_eq!(inst.memory(0).unwrap().data().len(), 2 * PAGE_SIZE);
    let t = trap_of(inst.invoke("load", &[Value::I32(2 * page)]));
    assert_eq!(t.kind, TrapKind::OutOfBoundsMemory);
    assert!(t.message.starts_with("i32.load: "), "{}", t.message);

    assert_eq!(inst.invoke("grow", &[Value::I32(0)]).unwrap(), vec![Value::I32(2)]);
}

#[test]
fn configured_page_cap_bounds_growth() {
    let config = Config { max_memory_pages: 3, ..Config::default() };
    let mut inst = instantiate_with(memory_module(1, None), &NoImports, &config);
    assert_eq!(inst.invoke("grow", &[Value::I32(2)]).unwrap(), vec![Value::I32(1)]);
    assert_eq!(inst.invoke("grow", &[Value::I32(1)]).unwrap(), vec![Value::I32(-1)]);
    assert_eq!(inst.invoke("size", &[]).unwrap(), vec![Value::I32(3)]);
}

// Golden: an initial size above the configured cap fails instantiation instead of overshooting it.
#[test]
fn initial_size_above_cap_is_a_link_error() {
    let config = Config { max_memory_pages: 2, ..Config::default() };
    match Instance::new(validated(memory_module(4, None)), &NoImports, &config) {
        Err(LinkError::Allocation { kind: "memory", min: 4, limit: 2 }) => {}
        other => panic!("expected an allocation error, got {other:?}"),
    }
    // At the cap, growth by zero reports the current size.
    let mut inst = instantiate_with(memory_module(2, None), &NoImports, &config);
    assert_eq!(inst.invoke("grow", &[Value::I32(0)]).unwrap(), vec![Value::I32(2)]);

    let mut b = ModuleBuilder::new();
    b.table(RefType::FuncRef, u32::MAX, None);
    let config = Config { max_table_elems: 1 << 16, ..Config::default() };
    match Instance::new(validated(b.build()), &NoImports, &config) {
        Err(LinkError::Allocation { kind: "table", min: u32::MAX, limit: 65536 }) => {}
        other => panic!("expected an allocation error, got {other:?}"),
    }
}

/// Five functions placed in slots 0..5 of an 8-slot table, plus `copy(dst, src, n)`.
fn table_copy_module() -> Module {
    let mut b = ModuleBuilder::new();
    let funcs: Vec<Option<u32>> = (0..5).map(|k| Some(b.func(&[], &[I32], &[], Asm::new().i32_const(k)))).collect();
    b.table(RefType::FuncRef, 8, None);
    b.active_elems(0, 0, &funcs);
    let copy = b.func(
        &[I32, I32, I32],
        &[],
        &[],
        Asm::new()
            .idx(op::LOCAL_GET, 0)
            .idx(op::LOCAL_GET, 1)
            .idx(op::LOCAL_GET, 2)
            .fc(op::fc::TABLE_COPY)
            .u32(0)
            .u32(0),
    );
    b.export("copy", copy);
    b.build()
}

fn slots(inst: &Instance) -> Vec<Ref> {
    let table = inst.table(0).unwrap();
    (0..table.size()).map(|i| table.get(i).unwrap()).collect()
}

// Golden: overlapping copies in either direction equal a copy through a temporary.
#[test]
fn golden_table_copy_overlap_matches_temporary_buffer() {
    let m = table_copy_module();
    for (dst, src, n) in [(2, 0, 5), (0, 2, 5), (1, 1, 3), (0, 0, 8), (3, 4, 0), (7, 0, 1)] {
        let mut inst = instantiate(m.clone());
        let before = slots(&inst);
        let tmp = before[src..src + n].to_vec();
        let mut expected = before.clone();
        expected[dst..dst + n].copy_from_slice(&tmp);

        let args = [dst, src, n].map(|v| Value::I32(v as i32));
        inst.invoke("copy", &args).unwrap();
        assert_eq!(slots(&inst), expected, "copy({dst}, {src}, {n})");
    }

    for (dst, src, n) in [(6, 0, 3), (0, 7, 2), (8, 0, 1), (0, 0, 9)] {
        let mut inst = instantiate(m.clone());
        let before = slots(&inst);
        let r = inst.invoke("copy", &[Value::I32(dst), Value::I32(src), Value::I32(n)]);
        assert_eq!(kind_of(r), TrapKind::OutOfBoundsTable);
        assert_eq!(slots(&inst), before);
    }
}

// Golden: slot 0 matches, slot 1 is null, slot 2 has the wrong type, 3 is past the end.
#[test]
fn golden_call_indirect_traps_in_any_order() {
    let mut b = ModuleBuilder::new();
    let ty = b.ty(&[], &[I32]);
    let good = b.func(&[], &[I32], &[], Asm::new().i32_const(42));
    let wrong = b.func(&[], &[I64], &[], Asm::new().i64_const(7));
    b.table(RefType::FuncRef, 3, None);
    b.active_elems(0, 0, &[Some(good), None, Some(wrong)]);
    let call = b.func(&[I32], &[I32], &[], Asm::new().idx(op::LOCAL_GET, 0).idx(op::CALL_INDIRECT, ty).u32(0));
    b.export("call", call);
    let m = b.build();

    let expect = |i: i32| match i {
        0 => Ok(42),
        1 => Err(TrapKind::NullReference),
        2 => Err(TrapKind::IndirectCallTypeMismatch),
        _ => Err(TrapKind::OutOfBoundsTable),
    };
    let mut shared = instantiate(m.clone());
    for order in [[0, 1, 2, 3], [3, 1, 2, 0], [2, 0, 3, 1], [1, 3, 0, 2]] {
        let mut fresh = instantiate(m.clone());
        for i in order {
            for inst in [&mut fresh, &mut shared] {
                let got = match inst.invoke("call", &[Value::I32(i)]) {
                    Ok(v) => Ok(match v[..] {
                        [Value::I32(x)] => x,
                        _ => panic!("unexpected results {v:?}"),
                    }),
                    Err(e) => Err(trap_of(Err(e)).kind),
                };
                assert_eq!(got, expect(i), "index {i} in order {order:?}");
            }
        }
    }

    let t = trap_of(shared.invoke("call", &[Value::I32(1)]));
    assert_eq!(t.message, "call_indirect: table 0 slot 1");
    assert_eq!(kind_of(shared.invoke("call", &[Value::I32(-1)])), TrapKind::OutOfBoundsTable);
}

// Golden: indices past the target list, including negative ones, take the default.
#[test]
fn golden_br_table_out_of_range_takes_default() {
    let body = Asm::new()
        .open(op::BLOCK, EMPTY)
        .open(op::BLOCK, EMPTY)
        .open(op::BLOCK, EMPTY)
        .idx(op::LOCAL_GET, 0)
        .br_table(&[0, 1], 2)
        .end()
        .i32_const(10)
        .op(op::RETURN)
        .end()
        .i32_const(11)
        .op(op::RETURN)
        .end()
        .i32_const(12);
    let mut inst = instantiate(single(&[I32], &[I32], &[], body));
    for (index, want) in [(0, 10), (1, 11), (2, 12), (3, 12), (-1, 12), (i32::MAX, 12)] {
        assert_eq!(inst.invoke("f", &[Value::I32(index)]).unwrap(), vec![Value::I32(want)], "index {index}");
    }

    // Branch values travel with the label.
    let body = Asm::new()
        .open(op::BLOCK, T_I32)
        .open(op::BLOCK, T_I32)
        .i32_const(7)
        .idx(op::LOCAL_GET, 0)
        .br_table(&[0], 1)
        .end()
        .i32_const(1)
        .op(op::I32_ADD)
        .end();
    let mut inst = instantiate(single(&[I32], &[I32], &[], body));
    assert_eq!(inst.invoke("f", &[Value::I32(0)]).unwrap(), vec![Value::I32(8)]);
    assert_eq!(inst.invoke("f", &[Value::I32(1)]).unwrap(), vec![Value::I32(7)]);
    assert_eq!(inst.invoke("f", &[Value::I32(9)]).unwrap(), vec![Value::I32(7)]);
}

#[test]
fn loops_and_recursion() {
    let sum = Asm::new()
        .open(op::BLOCK, EMPTY)
        .open(op::LOOP, EMPTY)
        .idx(op::LOCAL_GET, 0)
        .op(op::I32_EQZ)
        .idx(op::BR_IF, 1)
        .idx(op::LOCAL_GET, 1)
        .idx(op::LOCAL_GET, 0)
        .op(op::I32_ADD)
        .idx(op::LOCAL_SET, 1)
        .idx(op::LOCAL_GET, 0)
        .i32_const(1)
        .op(op::I32_SUB)
        .idx(op::LOCAL_SET, 0)
        .idx(op::BR, 0)
        .end()
        .end()
        .idx(op::LOCAL_GET, 1);
    let mut inst = instantiate(single(&[I32], &[I32], &[I32], sum));
    assert_eq!(inst.invoke("f", &[Value::I32(100)]).unwrap(), vec![Value::I32(5050)]);
    assert_eq!(inst.invoke("f", &[Value::I32(0)]).unwrap(), vec![Value::I32(0)]);

    let fib = Asm::new()
        .idx(op::LOCAL_GET, 0)
        .i32_const(2)
        .op(op::I32_LT_S)
        .open(op::IF, T_I32)
        .idx(op::LOCAL_GET, 0)
        .op(op::ELSE)
        .idx(op::LOCAL_GET, 0)
        .i32_const(1)
        .op(op::I32_SUB)
        .idx(op::CALL, 0)
        .idx(op::LOCAL_GET, 0)
        .i32_const(2)
        .op(op::I32_SUB)
        .idx(op::CALL, 0)
        .op(op::I32_ADD)
        .end();
    let mut inst = instantiate(single(&[I32], &[I32], &[], fib));
    let (mut a, mut b) = (0, 1);
    for n in 0..20 {
        assert_eq!(inst.invoke("f", &[Value::I32(n)]).unwrap(), vec![Value::I32(a)], "fib({n})");
        (a, b) = (b, a + b);
    }
}

#[test]
fn wide_values_move_as_two_cells() {
    let mut b = ModuleBuilder::new();
    let sel = |t| Asm::new().idx(op::LOCAL_GET, 0).idx(op::LOCAL_GET, 1).idx(op::LOCAL_GET, 2).op(t);
    let sel64 = b.func(&[I64, I64, I32], &[I64], &[], sel(op::SELECT));
    let self64 = b.func(&[F64, F64, I32], &[F64], &[], sel(op::SELECT));
    let typed = b.func(&[I64, I64, I32], &[I64], &[], Asm::new()
        .idx(op::LOCAL_GET, 0)
        .idx(op::LOCAL_GET, 1)
        .idx(op::LOCAL_GET, 2)
        .ops(&[op::SELECT_T, 1, T_I64]));
    let under = b.func(&[I64, I32], &[I32], &[], Asm::new().idx(op::LOCAL_GET, 1).idx(op::LOCAL_GET, 0).op(op::DROP));
    // Mixed-width params and locals: returns p1 + p0 through i64 locals.
    let mixed = b.func(&[I32, I64, F64], &[I64], &[I64, I32, F64], Asm::new()
        .idx(op::LOCAL_GET, 1)
        .idx(op::LOCAL_SET, 3)
        .idx(op::LOCAL_GET, 0)
        .idx(op::LOCAL_SET, 4)
        .idx(op::LOCAL_GET, 2)
        .idx(op::LOCAL_TEE, 5)
        .op(op::DROP)
        .idx(op::LOCAL_GET, 3)
        .idx(op::LOCAL_GET, 4)
        .op(op::I64_EXTEND_I32_S)
        .op(op::I64_ADD));
    let fadd = b.func(&[F64, F64], &[F64], &[], Asm::new().idx(op::LOCAL_GET, 0).idx(op::LOCAL_GET, 1).op(op::F64_ADD));
    b.export("sel64", sel64).export("self64", self64).export("typed", typed);
    b.export("under", under).export("mixed", mixed).export("fadd", fadd);
    let mut inst = instantiate(b.build());

    let big = 0x1234_5678_9ABC_DEF0_i64;
    for (cond, want) in [(1, big), (0, -1), (-5, big)] {
        let args = [Value::I64(big), Value::I64(-1), Value::I32(cond)];
        assert_eq!(inst.invoke("sel64", &args).unwrap(), vec![Value::I64(want)]);
        assert_eq!(inst.invoke("typed", &args).unwrap(), vec![Value::I64(want)]);
    }
    let fargs = |c| [Value::from_f64(1.5), Value::from_f64(-0.25), Value::I32(c)];
    assert_eq!(inst.invoke("self64", &fargs(0)).unwrap(), vec![Value::from_f64(-0.25)]);
    assert_eq!(inst.invoke("self64", &fargs(1)).unwrap(), vec![Value::from_f64(1.5)]);

    assert_eq!(inst.invoke("under", &[Value::I64(big), Value::I32(9)]).unwrap(), vec![Value::I32(9)]);
    assert_eq!(
        inst.invoke("mixed", &[Value::I32(-2), Value::I64(1 << 33), Value::from_f64(0.5)]).unwrap(),
        vec![Value::I64((1 << 33) - 2)]
    );
    assert_eq!(
        inst.invoke("fadd", &[Value::from_f64(1.5), Value::from_f64(2.25)]).unwrap(),
        vec![Value::from_f64(3.75)]
    );
}

#[test]
fn narrow_loads_extend_by_signedness() {
    let mut b = ModuleBuilder::new();
    b.memory(1, None).active_data(0, &[0x80, 0xFF, 0xFF, 0xFF, 0x7F]);
    let loads = [
        ("l8s", I32, op::I32_LOAD8_S, 0),
        ("l8u", I32, op::I32_LOAD8_U, 0),
        ("l16s", I32, op::I32_LOAD16_S, 1),
        ("l16u", I32, op::I32_LOAD16_U, 1),
        ("l32s", I64, op::I64_LOAD32_S, 2),
        ("l32u", I64, op::I64_LOAD32_U, 2),
    ];
    for (name, t, opcode, align) in loads {
        let f = b.func(&[], &[t], &[], Asm::new().i32_const(0).mem(opcode, align, 0));
        b.export(name, f);
    }
    let store8 = b.func(&[I32], &[], &[], Asm::new().i32_const(4).idx(op::LOCAL_GET, 0).mem(op::I32_STORE8, 0, 0));
    b.export("store8", store8);
    let mut inst = instantiate(b.build());

    assert_eq!(inst.invoke("l8s", &[]).unwrap(), vec![Value::I32(-128)]);
    assert_eq!(inst.invoke("l8u", &[]).unwrap(), vec![Value::I32(128)]);
    assert_eq!(inst.invoke("l16s", &[]).unwrap(), vec![Value::I32(-128)]);
    assert_eq!(inst.invoke("l16u", &[]).unwrap(), vec![Value::I32(0xFF80)]);
    assert_eq!(inst.invoke("l32s", &[]).unwrap(), vec![Value::I64(-128)]);
    assert_eq!(inst.invoke("l32u", &[]).unwrap(), vec![Value::I64(0xFFFF_FF80)]);

    inst.invoke("store8", &[Value::I32(0x1234)]).unwrap();
    assert_eq!(inst.memory(0).unwrap().data()[4], 0x34);
}

#[test]
fn host_functions_are_called_through_imports() {
    let mut host = HostFuncs::new();
    host.define("env", "double", FuncType::new(&[I64], &[I64]), |args| match args {
        [Value::I64(v)] => Ok(vec![Value::I64(v * 2)]),
        _ => Err(Trap::new(TrapKind::Host, "bad arguments")),
    })
    .define("env", "fail", FuncType::new(&[], &[]), |_| Err(Trap::new(TrapKind::Host, "boom")))
    .define("env", "liar", FuncType::new(&[], &[I32]), |_| Ok(vec![Value::I64(1)]));

    let mut b = ModuleBuilder::new();
    let double = b.import_func("env", "double", &[I64], &[I64]);
    let fail = b.import_func("env", "fail", &[], &[]);
    let liar = b.import_func("env", "liar", &[], &[I32]);
    let f = b.func(&[I64], &[I64], &[], Asm::new().idx(op::LOCAL_GET, 0).idx(op::CALL, double).i64_const(1).op(op::I64_ADD));
    let g = b.func(&[], &[], &[], Asm::new().idx(op::CALL, fail));
    let h = b.func(&[], &[I32], &[], Asm::new().idx(op::CALL, liar));
    b.export("f", f).export("g", g).export("h", h).export("double", double);
    let m = b.build();

    let mut inst = instantiate_with(m.clone(), &host, &Config::default());
    assert_eq!(inst.invoke("f", &[Value::I64(20)]).unwrap(), vec![Value::I64(41)]);
    assert_eq!(inst.invoke("double", &[Value::I64(-4)]).unwrap(), vec![Value::I64(-8)]);
    let t = trap_of(inst.invoke("g", &[]));
    assert_eq!((t.kind, t.message.as_str()), (TrapKind::Host, "boom"));
    assert_eq!(kind_of(inst.invoke("h", &[])), TrapKind::Host);
    assert_eq!(inst.invoke("f", &[Value::I64(1)]).unwrap(), vec![Value::I64(3)]);

    assert!(matches!(link(m.clone(), &NoImports), Err(LinkError::UnresolvedImport { .. })));

    // A registered function of another type does not satisfy the import.
    let mut other = host.clone();
    other.define("env", "double", FuncType::new(&[I32], &[I32]), |args| Ok(args.to_vec()));
    match link(m, &other) {
        Err(LinkError::UnresolvedImport { module, name }) => assert_eq!((module.as_str(), name.as_str()), ("env", "double")),
        other => panic!("expected an unresolved import, got {other:?}"),
    }
}

// Golden: the handle that encodes null never enters wasm disguised as a null reference.
#[test]
fn reserved_reference_handle_is_rejected_at_the_boundary() {
    let mut host = HostFuncs::new();
    host.define("env", "make", FuncType::new(&[], &[ExternRef]), |_| {
        Ok(vec![Value::ExternRef(Some(RESERVED_REF))])
    });
    let mut b = ModuleBuilder::new();
    let make = b.import_func("env", "make", &[], &[ExternRef]);
    let is_null = b.func(&[ExternRef], &[I32], &[], Asm::new().idx(op::LOCAL_GET, 0).op(op::REF_IS_NULL));
    let made = b.func(&[], &[I32], &[], Asm::new().idx(op::CALL, make).op(op::REF_IS_NULL));
    b.export("is_null", is_null).export("made", made);
    let mut inst = instantiate_with(b.build(), &host, &Config::default());

    match inst.invoke("is_null", &[Value::ExternRef(Some(RESERVED_REF))]) {
        Err(InvokeError::ReservedReference { index: 0 }) => {}
        other => panic!("expected a reserved-reference error, got {other:?}"),
    }
    assert_eq!(inst.invoke("is_null", &[Value::ExternRef(Some(RESERVED_REF - 1))]).unwrap(), vec![Value::I32(0)]);
    assert_eq!(inst.invoke("is_null", &[Value::ExternRef(None)]).unwrap(), vec![Value::I32(1)]);
    assert_eq!(kind_of(inst.invoke("made", &[])), TrapKind::Host);
}

/// Resolver handing out one memory and one immutable global.
struct Env;

impl ImportResolver for Env {
    fn resolve_func(&self, _: &str, _: &str, _: &FuncType) -> Option<Arc<HostFunc>> {
        None
    }

    fn resolve_memory(&self, _: &str, name: &str, _: &MemoryType) -> Option<MemoryInstance> {
        if name != "mem" {
            return None;
        }
        MemoryInstance::new(&MemoryType::new(Limits::new(1, Some(2))), MAX_PAGES)
    }

    fn resolve_global(&self, _: &str, name: &str, ty: &GlobalType) -> Option<GlobalInstance> {
        (name == "base").then(|| GlobalInstance::new(*ty, Value::I32(40)))
    }
}

#[test]
fn imported_memory_and_globals_feed_initializers() {
    let mut b = ModuleBuilder::new();
    let import = |name: &str, desc| Import { module: "env".into(), name: name.into(), desc };
    b.module.imports.push(import("mem", ImportDesc::Memory(MemoryType::new(Limits::new(1, None)))));
    b.module.imports.push(import("base", ImportDesc::Global(GlobalType::new(I32, false))));
    // Defined globals follow the imported one.
    let g = b.global(I32, true, Asm::new().idx(op::GLOBAL_GET, 0)) + 1;
    b.module.data.push(duplex_wasm::model::DataSegment {
        mode: duplex_wasm::model::DataMode::Active { memory: 0, offset: Asm::new().idx(op::GLOBAL_GET, 0).expr() },
        init: vec![7],
    });
    let bump = b.func(&[], &[I32], &[], Asm::new()
        .idx(op::GLOBAL_GET, g)
        .i32_const(2)
        .op(op::I32_ADD)
        .idx(op::GLOBAL_SET, g)
        .idx(op::GLOBAL_GET, g));
    b.export("bump", bump).export_desc("g", ExportDesc::Global(g)).export_desc("base", ExportDesc::Global(0));
    let m = b.build();

    let mut inst = link(m.clone(), &Env).unwrap();
    assert_eq!(inst.memory(0).unwrap().data()[40], 7);
    assert_eq!(inst.exported_global("g"), Some(Value::I32(40)));
    assert_eq!(inst.invoke("bump", &[]).unwrap(), vec![Value::I32(42)]);
    assert_eq!(inst.invoke("bump", &[]).unwrap(), vec![Value::I32(44)]);
    assert_eq!(inst.exported_global("g"), Some(Value::I32(44)));
    assert_eq!(inst.exported_global("base"), Some(Value::I32(40)));
    assert!(matches!(inst.invoke("g", &[]), Err(InvokeError::NotAFunction(_))));

    // Host writes go through the declared type and mutability.
    assert!(inst.global_mut(g).unwrap().set(Value::I64(1)).is_err());
    assert!(inst.global_mut(0).unwrap().set(Value::I32(1)).is_err());
    inst.global_mut(g).unwrap().set(Value::I32(100)).unwrap();
    assert_eq!(inst.invoke("bump", &[]).unwrap(), vec![Value::I32(102)]);

    assert!(matches!(link(m, &NoImports), Err(LinkError::UnresolvedImport { .. })));
}

#[test]
fn interrupt_stops_a_running_loop() {
    let m = single(&[], &[], &[], Asm::new().open(op::LOOP, EMPTY).idx(op::BR, 0).end());
    let mut inst = instantiate(m);
    let addr = inst.exported_func("f").unwrap();

    let flag = Arc::new(AtomicBool::new(false));
    let setter = {
        let flag = Arc::clone(&flag);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            flag.store(true, Ordering::Relaxed);
        })
    };
    let mut cx = inst.exec();
    cx.set_interrupt(Arc::clone(&flag));
    let t = trap_of(cx.invoke(addr, &[]));
    setter.join().unwrap();
    assert_eq!(t.kind, TrapKind::Interrupted);
    assert_eq!((cx.depth(), cx.stack_height()), (0, 0));

    // The flag stays raised, so the next run stops at its first branch.
    let again = trap_of(cx.invoke(addr, &[]));
    assert_eq!(again.kind, TrapKind::Interrupted);
}

#[test]
fn call_depth_is_bounded_and_recoverable() {
    let down = Asm::new()
        .idx(op::LOCAL_GET, 0)
        .op(op::I32_EQZ)
        .open(op::IF, T_I32)
        .i32_const(0)
        .op(op::ELSE)
        .idx(op::LOCAL_GET, 0)
        .i32_const(1)
        .op(op::I32_SUB)
        .idx(op::CALL, 0)
        .i32_const(1)
        .op(op::I32_ADD)
        .end();
    let config = Config { max_frames: 64, ..Config::default() };
    let mut inst = instantiate_with(single(&[I32], &[I32], &[], down), &NoImports, &config);
    assert_eq!(inst.invoke("f", &[Value::I32(50)]).unwrap(), vec![Value::I32(50)]);

    let addr = inst.exported_func("f").unwrap();
    let mut cx = inst.exec();
    let t = trap_of(cx.invoke(addr, &[Value::I32(1000)]));
    assert_eq!(t.kind, TrapKind::CallStackExhausted);
    assert_eq!((cx.depth(), cx.stack_height()), (0, 0));
    assert_eq!(cx.invoke(addr, &[Value::I32(63)]).unwrap(), vec![Value::I32(63)]);

    // Unbounded recursion under the default limit traps instead of overflowing the native stack.
    let forever = single(&[], &[], &[], Asm::new().idx(op::CALL, 0));
    assert_eq!(kind_of(instantiate(forever).invoke("f", &[])), TrapKind::CallStackExhausted);

    // Locals count against the operand stack capacity.
    let config = Config { max_stack_cells: 100, ..Config::default() };
    let wide = single(&[], &[], &[I64; 60], Asm::new());
    let mut inst = instantiate_with(wide, &NoImports, &config);
    assert_eq!(kind_of(inst.invoke("f", &[])), TrapKind::CallStackExhausted);
}

#[test]
fn start_function_runs_at_instantiation() {
    let mut b = ModuleBuilder::new();
    let g = b.global(I32, true, Asm::new().i32_const(0));
    let start = b.func(&[], &[], &[], Asm::new().i32_const(99).idx(op::GLOBAL_SET, g));
    b.module.start = Some(start);
    b.export_desc("g", ExportDesc::Global(g));
    let inst = instantiate(b.build());
    assert_eq!(inst.exported_global("g"), Some(Value::I32(99)));

    let mut b = ModuleBuilder::new();
    let start = b.func(&[], &[], &[], Asm::new().op(op::UNREACHABLE));
    b.module.start = Some(start);
    match link(b.build(), &NoImports) {
        Err(LinkError::StartTrap(t)) => {
            assert_eq!(t.kind, TrapKind::Unreachable);
            assert_eq!(t.message, "unreachable");
        }
        other => panic!("expected a start trap, got {other:?}"),
    }
}

#[test]
fn segments_initialize_and_drop() {
    let mut b = ModuleBuilder::new();
    b.memory(1, None).active_data(100, b"abc").passive_data(b"hello");
    b.module.data_count = Some(2);
    let range = || Asm::new().idx(op::LOCAL_GET, 0).idx(op::LOCAL_GET, 1).idx(op::LOCAL_GET, 2);
    let init = b.func(&[I32, I32, I32], &[], &[], range().fc(op::fc::MEMORY_INIT).u32(1).op(0));
    let init_active = b.func(&[I32, I32, I32], &[], &[], range().fc(op::fc::MEMORY_INIT).u32(0).op(0));
    let drop = b.func(&[], &[], &[], Asm::new().fc(op::fc::DATA_DROP).u32(1));
    let copy = b.func(&[I32, I32, I32], &[], &[], range().fc(op::fc::MEMORY_COPY).op(0).op(0));
    let fill = b.func(&[I32, I32, I32], &[], &[], range().fc(op::fc::MEMORY_FILL).op(0));
    b.export("init", init).export("init_active", init_active).export("drop", drop);
    b.export("copy", copy).export("fill", fill);
    let mut inst = instantiate(b.build());
    let args = |d: i32, s: i32, n: i32| [Value::I32(d), Value::I32(s), Value::I32(n)];
    let mem = |inst: &Instance, r: std::ops::Range<usize>| inst.memory(0).unwrap().data()[r].to_vec();

    assert_eq!(mem(&inst, 100..103), b"abc");
    inst.invoke("init", &args(10, 1, 4)).unwrap();
    assert_eq!(mem(&inst, 10..14), b"ello");
    assert_eq!(kind_of(inst.invoke("init", &args(0, 3, 3))), TrapKind::OutOfBoundsMemory);

    // Active segments are dropped once applied.
    inst.invoke("init_active", &args(0, 0, 0)).unwrap();
    assert_eq!(kind_of(inst.invoke("init_active", &args(0, 0, 1))), TrapKind::OutOfBoundsMemory);

    inst.invoke("drop", &[]).unwrap();
    inst.invoke("drop", &[]).unwrap();
    inst.invoke("init", &args(0, 0, 0)).unwrap();
    assert_eq!(kind_of(inst.invoke("init", &args(0, 0, 1))), TrapKind::OutOfBoundsMemory);

    inst.invoke("copy", &args(11, 10, 4)).unwrap();
    assert_eq!(mem(&inst, 10..15), b"eello");
    inst.invoke("fill", &args(20, 0x2A, 3)).unwrap();
    assert_eq!(mem(&inst, 19..24), [0, 0x2A, 0x2A, 0x2A, 0]);
    assert_eq!(kind_of(inst.invoke("fill", &args(PAGE_SIZE as i32 - 1, 1, 2))), TrapKind::OutOfBoundsMemory);
    assert_eq!(mem(&inst, PAGE_SIZE - 1..PAGE_SIZE), [0]);

    // Out-of-range active segments fail instantiation.
    let mut b = ModuleBuilder::new();
    b.memory(1, None).active_data(PAGE_SIZE as i32 - 1, b"xy");
    assert!(matches!(link(b.build(), &NoImports), Err(LinkError::DataOutOfBounds)));

    let mut b = ModuleBuilder::new();
    let f = b.func(&[], &[], &[], Asm::new());
    b.table(RefType::FuncRef, 2, None);
    b.active_elems(0, 1, &[Some(f), Some(f)]);
    assert!(matches!(link(b.build(), &NoImports), Err(LinkError::ElemOutOfBounds)));
}

#[test]
fn table_instructions() {
    let mut b = ModuleBuilder::new();
    let f0 = b.func(&[], &[I32], &[], Asm::new().i32_const(100));
    let f1 = b.func(&[], &[I32], &[], Asm::new().i32_const(101));
    let ty = b.ty(&[], &[I32]);
    b.table(RefType::FuncRef, 4, None);
    b.table(RefType::ExternRef, 1, Some(4));
    b.module.elements.push(ElementSegment {
        ty: RefType::FuncRef,
        mode: ElemMode::Passive,
        init: vec![Asm::new().idx(op::REF_FUNC, f0).expr(), Asm::new().idx(op::REF_FUNC, f1).expr()],
    });
    let get = |i| Asm::new().idx(op::LOCAL_GET, i);
    let funcs: [(&str, &[ValType], &[ValType], Asm); 11] = [
        ("init", &[I32, I32, I32], &[], get(0).idx(op::LOCAL_GET, 1).idx(op::LOCAL_GET, 2).fc(op::fc::TABLE_INIT).u32(0).u32(0)),
        ("elem_drop", &[], &[], Asm::new().fc(op::fc::ELEM_DROP).u32(0)),
        ("call", &[I32], &[I32], get(0).idx(op::CALL_INDIRECT, ty).u32(0)),
        ("grow", &[ExternRef, I32], &[I32], get(0).idx(op::LOCAL_GET, 1).fc(op::fc::TABLE_GROW).u32(1)),
        ("size", &[], &[I32], Asm::new().fc(op::fc::TABLE_SIZE).u32(1)),
        ("get", &[I32], &[ExternRef], get(0).idx(op::TABLE_GET, 1)),
        ("set", &[I32, ExternRef], &[], get(0).idx(op::LOCAL_GET, 1).idx(op::TABLE_SET, 1)),
        ("fill", &[I32, ExternRef, I32], &[], get(0).idx(op::LOCAL_GET, 1).idx(op::LOCAL_GET, 2).fc(op::fc::TABLE_FILL).u32(1)),
        ("is_null", &[FuncRef], &[I32], get(0).op(op::REF_IS_NULL)),
        ("extern_is_null", &[ExternRef], &[I32], get(0).op(op::REF_IS_NULL)),
        ("funcref", &[], &[FuncRef], Asm::new().idx(op::REF_FUNC, f1)),
    ];
    for (name, params, results, body) in funcs {
        let f = b.func(params, results, &[], body);
        b.export(name, f);
    }
    let mut inst = instantiate(b.build());
    let i = Value::I32;
    let ext = Value::ExternRef;

    inst.invoke("init", &[i(1), i(0), i(2)]).unwrap();
    assert_eq!(inst.invoke("call", &[i(1)]).unwrap(), vec![i(100)]);
    assert_eq!(inst.invoke("call", &[i(2)]).unwrap(), vec![i(101)]);
    assert_eq!(kind_of(inst.invoke("init", &[i(3), i(0), i(2)])), TrapKind::OutOfBoundsTable);
    inst.invoke("elem_drop", &[]).unwrap();
    inst.invoke("init", &[i(0), i(0), i(0)]).unwrap();
    assert_eq!(kind_of(inst.invoke("init", &[i(0), i(0), i(1)])), TrapKind::OutOfBoundsTable);

    assert_eq!(inst.invoke("grow", &[ext(Some(5)), i(2)]).unwrap(), vec![i(1)]);
    assert_eq!(inst.invoke("size", &[]).unwrap(), vec![i(3)]);
    assert_eq!(inst.invoke("get", &[i(2)]).unwrap(), vec![ext(Some(5))]);
    assert_eq!(inst.invoke("get", &[i(0)]).unwrap(), vec![ext(None)]);
    assert_eq!(inst.invoke("grow", &[ext(None), i(2)]).unwrap(), vec![i(-1)]);
    assert_eq!(inst.invoke("size", &[]).unwrap(), vec![i(3)]);
    inst.invoke("set", &[i(0), ext(Some(8))]).unwrap();
    assert_eq!(inst.invoke("get", &[i(0)]).unwrap(), vec![ext(Some(8))]);
    assert_eq!(kind_of(inst.invoke("get", &[i(3)])), TrapKind::OutOfBoundsTable);

    inst.invoke("fill", &[i(1), ext(Some(9)), i(2)]).unwrap();
    assert_eq!(inst.table(1).unwrap().get(2), Ok(Some(9)));
    assert_eq!(kind_of(inst.invoke("fill", &[i(2), ext(None), i(2)])), TrapKind::OutOfBoundsTable);
    assert_eq!(inst.table(1).unwrap().get(2), Ok(Some(9)));

    assert_eq!(inst.invoke("is_null", &[Value::FuncRef(None)]).unwrap(), vec![i(1)]);
    assert_eq!(inst.invoke("is_null", &[Value::FuncRef(Some(f0))]).unwrap(), vec![i(0)]);
    assert_eq!(inst.invoke("extern_is_null", &[ext(Some(7))]).unwrap(), vec![i(0)]);
    assert_eq!(inst.invoke("extern_is_null", &[ext(None)]).unwrap(), vec![i(1)]);
    assert_eq!(inst.invoke("funcref", &[]).unwrap(), vec![Value::FuncRef(Some(f1))]);
}

#[test]
fn invoke_checks_arguments() {
    let mut inst = instantiate(binop(I32, op::I32_ADD));
    assert!(matches!(
        inst.invoke("f", &[Value::I32(1)]),
        Err(InvokeError::ArgumentCount { expected: 2, found: 1, .. })
    ));
    assert!(matches!(
        inst.invoke("f", &[Value::I32(1), Value::I64(2)]),
        Err(InvokeError::ArgumentType { index: 1, expected: ValType::I32, found: ValType::I64 })
    ));
    assert!(matches!(inst.invoke("missing", &[]), Err(InvokeError::ExportNotFound(_))));
    assert_eq!(
        duplex_wasm::invoke_export(&mut inst, "f", &[Value::I32(2), Value::I32(3)]).unwrap(),
        vec![Value::I32(5)]
    );
}

#[test]
fn float_results_keep_their_bits() {
    let mut b = ModuleBuilder::new();
    let neg = b.func(&[F32], &[F32], &[], Asm::new().idx(op::LOCAL_GET, 0).op(op::F32_NEG));
    let min = b.func(&[F64, F64], &[F64], &[], Asm::new().idx(op::LOCAL_GET, 0).idx(op::LOCAL_GET, 1).op(op::F64_MIN));
    let nearest = b.func(&[F64], &[F64], &[], Asm::new().idx(op::LOCAL_GET, 0).op(op::F64_NEAREST));
    b.export("neg", neg).export("min", min).export("nearest", nearest);
    let mut inst = instantiate(b.build());

    let payload = 0x7FC0_0001;
    assert_eq!(inst.invoke("neg", &[Value::F32(payload)]).unwrap(), vec![Value::F32(payload | 0x8000_0000)]);
    assert_eq!(
        inst.invoke("min", &[Value::from_f64(0.0), Value::from_f64(-0.0)]).unwrap(),
        vec![Value::from_f64(-0.0)]
    );
    for (x, want) in [(2.5, 2.0), (3.5, 4.0), (-2.5, -2.0), (0.4, 0.0)] {
        assert_eq!(inst.invoke("nearest", &[Value::from_f64(x)]).unwrap(), vec![Value::from_f64(want)], "{x}");
    }
}
