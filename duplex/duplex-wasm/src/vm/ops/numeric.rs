//! Constants, comparisons, arithmetic and conversions.
//!
//! Each operator is a closure over Rust scalars. [`Cx::apply1`] and
//! [`Cx::apply2`] supply the typing in validation and the stack traffic in
//! execution, so operand and result types are stated once per opcode.

use crate::binary::Cursor;
use crate::error::{CodeError, TrapKind};
use crate::vm::mode::Cx;

macro_rules! unop {
    ($name:ident, $a:ty => $r:ty, |$x:ident| $body:expr) => {
        pub(crate) fn $name(cx: &mut Cx<'_, '_>, _: &mut Cursor<'_>) -> Result<(), CodeError> {
            cx.apply1::<$a, $r>(|$x: $a| Ok($body))
        }
    };
}

macro_rules! binop {
    ($name:ident, $a:ty => $r:ty, |$x:ident, $y:ident| $body:expr) => {
        pub(crate) fn $name(cx: &mut Cx<'_, '_>, _: &mut Cursor<'_>) -> Result<(), CodeError> {
            cx.apply2::<$a, $r>(|$x: $a, $y: $a| Ok($body))
        }
    };
}

/// Binary operator whose body returns `Result<_, TrapKind>`.
macro_rules! binop_trapping {
    ($name:ident, $a:ty, |$x:ident, $y:ident| $body:expr) => {
        pub(crate) fn $name(cx: &mut Cx<'_, '_>, _: &mut Cursor<'_>) -> Result<(), CodeError> {
            cx.apply2::<$a, $a>(|$x: $a, $y: $a| $body)
        }
    };
}

macro_rules! trunc {
    ($name:ident, $f:ty => $i:ty as $via:ty, $lo:expr, $hi:expr) => {
        pub(crate) fn $name(cx: &mut Cx<'_, '_>, _: &mut Cursor<'_>) -> Result<(), CodeError> {
            cx.apply1::<$f, $i>(|x: $f| truncate(f64::from(x), $lo, $hi).map(|t| t as $via as $i))
        }
    };
}

// Exclusive integer range bounds, exact in both float widths.
const I32_LO: f64 = -2147483648.0;
const I32_HI: f64 = 2147483648.0;
const U32_HI: f64 = 4294967296.0;
const I64_LO: f64 = -9223372036854775808.0;
const I64_HI: f64 = 9223372036854775808.0;
const U64_HI: f64 = 18446744073709551616.0;

/// Truncate toward zero, trapping unless `lo <= trunc(x) < hi`.
fn truncate(x: f64, lo: f64, hi: f64) -> Result<f64, TrapKind> {
    if x.is_nan() {
        return Err(TrapKind::InvalidConversion);
    }
    let t = x.trunc();
    if t < lo || t >= hi {
        return Err(TrapKind::IntegerOverflow);
    }
    Ok(t)
}

macro_rules! float_min_max {
    ($min:ident, $max:ident, $t:ty) => {
        /// NaN-propagating minimum where -0 < +0.
        fn $min(a: $t, b: $t) -> $t {
            if a.is_nan() || b.is_nan() {
                a + b
            } else if a == b {
                <$t>::from_bits(a.to_bits() | b.to_bits())
            } else {
                a.min(b)
            }
        }

        /// NaN-propagating maximum where -0 < +0.
        fn $max(a: $t, b: $t) -> $t {
            if a.is_nan() || b.is_nan() {
                a + b
            } else if a == b {
                <$t>::from_bits(a.to_bits() & b.to_bits())
            } else {
                a.max(b)
            }
        }
    };
}

float_min_max!(fmin32, fmax32, f32);
float_min_max!(fmin64, fmax64, f64);

pub(crate) fn i32_const(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let v = cur.read_i32()?;
    cx.push(v);
    Ok(())
}

pub(crate) fn i64_const(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let v = cur.read_i64()?;
    cx.push(v);
    Ok(())
}

pub(crate) fn f32_const(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let bits = cur.read_f32_bits()?;
    cx.push(f32::from_bits(bits));
    Ok(())
}

pub(crate) fn f64_const(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let bits = cur.read_f64_bits()?;
    cx.push(f64::from_bits(bits));
    Ok(())
}

/* i32 comparisons */
unop!(i32_eqz, i32 => i32, |a| (a == 0) as i32);
binop!(i32_eq, i32 => i32, |a, b| (a == b) as i32);
binop!(i32_ne, i32 => i32, |a, b| (a != b) as i32);
binop!(i32_lt_s, i32 => i32, |a, b| (a < b) as i32);
binop!(i32_lt_u, i32 => i32, |a, b| ((a as u32) < (b as u32)) as i32);
binop!(i32_gt_s, i32 => i32, |a, b| (a > b) as i32);
binop!(i32_gt_u, i32 => i32, |a, b| ((a as u32) > (b as u32)) as i32);
binop!(i32_le_s, i32 => i32, |a, b| (a <= b) as i32);
binop!(i32_le_u, i32 => i32, |a, b| ((a as u32) <= (b as u32)) as i32);
binop!(i32_ge_s, i32 => i32, |a, b| (a >= b) as i32);
binop!(i32_ge_u, i32 => i32, |a, b| ((a as u32) >= (b as u32)) as i32);

/* i64 comparisons */
unop!(i64_eqz, i64 => i32, |a| (a == 0) as i32);
binop!(i64_eq, i64 => i32, |a, b| (a == b) as i32);
binop!(i64_ne, i64 => i32, |a, b| (a != b) as i32);
binop!(i64_lt_s, i64 => i32, |a, b| (a < b) as i32);
binop!(i64_lt_u, i64 => i32, |a, b| ((a as u64) < (b as u64)) as i32);
binop!(i64_gt_s, i64 => i32, |a, b| (a > b) as i32);
binop!(i64_gt_u, i64 => i32, |a, b| ((a as u64) > (b as u64)) as i32);
binop!(i64_le_s, i64 => i32, |a, b| (a <= b) as i32);
binop!(i64_le_u, i64 => i32, |a, b| ((a as u64) <= (b as u64)) as i32);
binop!(i64_ge_s, i64 => i32, |a, b| (a >= b) as i32);
binop!(i64_ge_u, i64 => i32, |a, b| ((a as u64) >= (b as u64)) as i32);

/* float comparisons */
binop!(f32_eq, f32 => i32, |a, b| (a == b) as i32);
binop!(f32_ne, f32 => i32, |a, b| (a != b) as i32);
binop!(f32_lt, f32 => i32, |a, b| (a < b) as i32);
binop!(f32_gt, f32 => i32, |a, b| (a > b) as i32);
binop!(f32_le, f32 => i32, |a, b| (a <= b) as i32);
binop!(f32_ge, f32 => i32, |a, b| (a >= b) as i32);
binop!(f64_eq, f64 => i32, |a, b| (a == b) as i32);
binop!(f64_ne, f64 => i32, |a, b| (a != b) as i32);
binop!(f64_lt, f64 => i32, |a, b| (a < b) as i32);
binop!(f64_gt, f64 => i32, |a, b| (a > b) as i32);
binop!(f64_le, f64 => i32, |a, b| (a <= b) as i32);
binop!(f64_ge, f64 => i32, |a, b| (a >= b) as i32);

/* i32 arithmetic */
unop!(i32_clz, i32 => i32, |a| a.leading_zeros() as i32);
unop!(i32_ctz, i32 => i32, |a| a.trailing_zeros() as i32);
unop!(i32_popcnt, i32 => i32, |a| a.count_ones() as i32);
binop!(i32_add, i32 => i32, |a, b| a.wrapping_add(b));
binop!(i32_sub, i32 => i32, |a, b| a.wrapping_sub(b));
binop!(i32_mul, i32 => i32, |a, b| a.wrapping_mul(b));
binop_trapping!(i32_div_s, i32, |a, b| match (a, b) {
    (_, 0) => Err(TrapKind::IntegerDivideByZero),
    (i32::MIN, -1) => Err(TrapKind::IntegerOverflow),
    _ => Ok(a / b),
});
binop_trapping!(i32_div_u, i32, |a, b| (a as u32)
    .checked_div(b as u32)
    .map(|r| r as i32)
    .ok_or(TrapKind::IntegerDivideByZero));
binop_trapping!(i32_rem_s, i32, |a, b| if b == 0 {
    Err(TrapKind::IntegerDivideByZero)
} else {
    Ok(a.wrapping_rem(b))
});
binop_trapping!(i32_rem_u, i32, |a, b| (a as u32)
    .checked_rem(b as u32)
    .map(|r| r as i32)
    .ok_or(TrapKind::IntegerDivideByZero));
binop!(i32_and, i32 => i32, |a, b| a & b);
binop!(i32_or, i32 => i32, |a, b| a | b);
binop!(i32_xor, i32 => i32, |a, b| a ^ b);
binop!(i32_shl, i32 => i32, |a, b| a.wrapping_shl(b as u32));
binop!(i32_shr_s, i32 => i32, |a, b| a.wrapping_shr(b as u32));
binop!(i32_shr_u, i32 => i32, |a, b| (a as u32).wrapping_shr(b as u32) as i32);
binop!(i32_rotl, i32 => i32, |a, b| a.rotate_left(b as u32));
binop!(i32_rotr, i32 => i32, |a, b| a.rotate_right(b as u32));

/* i64 arithmetic */
unop!(i64_clz, i64 => i64, |a| i64::from(a.leading_zeros()));
unop!(i64_ctz, i64 => i64, |a| i64::from(a.trailing_zeros()));
unop!(i64_popcnt, i64 => i64, |a| i64::from(a.count_ones()));
binop!(i64_add, i64 => i64, |a, b| a.wrapping_add(b));
binop!(i64_sub, i64 => i64, |a, b| a.wrapping_sub(b));
binop!(i64_mul, i64 => i64, |a, b| a.wrapping_mul(b));
binop_trapping!(i64_div_s, i64, |a, b| match (a, b) {
    (_, 0) => Err(TrapKind::IntegerDivideByZero),
    (i64::MIN, -1) => Err(TrapKind::IntegerOverflow),
    _ => Ok(a / b),
});
binop_trapping!(i64_div_u, i64, |a, b| (a as u64)
    .checked_div(b as u64)
    .map(|r| r as i64)
    .ok_or(TrapKind::IntegerDivideByZero));
binop_trapping!(i64_rem_s, i64, |a, b| if b == 0 {
    Err(TrapKind::IntegerDivideByZero)
} else {
    Ok(a.wrapping_rem(b))
});
binop_trapping!(i64_rem_u, i64, |a, b| (a as u64)
    .checked_rem(b as u64)
    .map(|r| r as i64)
    .ok_or(TrapKind::IntegerDivideByZero));
binop!(i64_and, i64 => i64, |a, b| a & b);
binop!(i64_or, i64 => i64, |a, b| a | b);
binop!(i64_xor, i64 => i64, |a, b| a ^ b);
binop!(i64_shl, i64 => i64, |a, b| a.wrapping_shl(b as u32));
binop!(i64_shr_s, i64 => i64, |a, b| a.wrapping_shr(b as u32));
binop!(i64_shr_u, i64 => i64, |a, b| (a as u64).wrapping_shr(b as u32) as i64);
binop!(i64_rotl, i64 => i64, |a, b| a.rotate_left(b as u32));
binop!(i64_rotr, i64 => i64, |a, b| a.rotate_right(b as u32));

/* f32 arithmetic */
unop!(f32_abs, f32 => f32, |a| a.abs());
unop!(f32_neg, f32 => f32, |a| -a);
unop!(f32_ceil, f32 => f32, |a| a.ceil());
unop!(f32_floor, f32 => f32, |a| a.floor());
unop!(f32_trunc, f32 => f32, |a| a.trunc());
unop!(f32_nearest, f32 => f32, |a| a.round_ties_even());
unop!(f32_sqrt, f32 => f32, |a| a.sqrt());
binop!(f32_add, f32 => f32, |a, b| a + b);
binop!(f32_sub, f32 => f32, |a, b| a - b);
binop!(f32_mul, f32 => f32, |a, b| a * b);
binop!(f32_div, f32 => f32, |a, b| a / b);
binop!(f32_min, f32 => f32, |a, b| fmin32(a, b));
binop!(f32_max, f32 => f32, |a, b| fmax32(a, b));
binop!(f32_copysign, f32 => f32, |a, b| a.copysign(b));

/* f64 arithmetic */
unop!(f64_abs, f64 => f64, |a| a.abs());
unop!(f64_neg, f64 => f64, |a| -a);
unop!(f64_ceil, f64 => f64, |a| a.ceil());
unop!(f64_floor, f64 => f64, |a| a.floor());
unop!(f64_trunc, f64 => f64, |a| a.trunc());
unop!(f64_nearest, f64 => f64, |a| a.round_ties_even());
unop!(f64_sqrt, f64 => f64, |a| a.sqrt());
binop!(f64_add, f64 => f64, |a, b| a + b);
binop!(f64_sub, f64 => f64, |a, b| a - b);
binop!(f64_mul, f64 => f64, |a, b| a * b);
binop!(f64_div, f64 => f64, |a, b| a / b);
binop!(f64_min, f64 => f64, |a, b| fmin64(a, b));
binop!(f64_max, f64 => f64, |a, b| fmax64(a, b));
binop!(f64_copysign, f64 => f64, |a, b| a.copysign(b));

/* conversions */
unop!(i32_wrap_i64, i64 => i32, |a| a as i32);
trunc!(i32_trunc_f32_s, f32 => i32 as i32, I32_LO, I32_HI);
trunc!(i32_trunc_f32_u, f32 => i32 as u32, 0.0, U32_HI);
trunc!(i32_trunc_f64_s, f64 => i32 as i32, I32_LO, I32_HI);
trunc!(i32_trunc_f64_u, f64 => i32 as u32, 0.0, U32_HI);
unop!(i64_extend_i32_s, i32 => i64, |a| i64::from(a));
unop!(i64_extend_i32_u, i32 => i64, |a| i64::from(a as u32));
trunc!(i64_trunc_f32_s, f32 => i64 as i64, I64_LO, I64_HI);
trunc!(i64_trunc_f32_u, f32 => i64 as u64, 0.0, U64_HI);
trunc!(i64_trunc_f64_s, f64 => i64 as i64, I64_LO, I64_HI);
trunc!(i64_trunc_f64_u, f64 => i64 as u64, 0.0, U64_HI);
unop!(f32_convert_i32_s, i32 => f32, |a| a as f32);
unop!(f32_convert_i32_u, i32 => f32, |a| a as u32 as f32);
unop!(f32_convert_i64_s, i64 => f32, |a| a as f32);
unop!(f32_convert_i64_u, i64 => f32, |a| a as u64 as f32);
unop!(f32_demote_f64, f64 => f32, |a| a as f32);
unop!(f64_convert_i32_s, i32 => f64, |a| f64::from(a));
unop!(f64_convert_i32_u, i32 => f64, |a| f64::from(a as u32));
unop!(f64_convert_i64_s, i64 => f64, |a| a as f64);
unop!(f64_convert_i64_u, i64 => f64, |a| a as u64 as f64);
unop!(f64_promote_f32, f32 => f64, |a| f64::from(a));
unop!(i32_reinterpret_f32, f32 => i32, |a| a.to_bits() as i32);
unop!(i64_reinterpret_f64, f64 => i64, |a| a.to_bits() as i64);
unop!(f32_reinterpret_i32, i32 => f32, |a| f32::from_bits(a as u32));
unop!(f64_reinterpret_i64, i64 => f64, |a| f64::from_bits(a as u64));

/* sign extension */
unop!(i32_extend8_s, i32 => i32, |a| i32::from(a as i8));
unop!(i32_extend16_s, i32 => i32, |a| i32::from(a as i16));
unop!(i64_extend8_s, i64 => i64, |a| i64::from(a as i8));
unop!(i64_extend16_s, i64 => i64, |a| i64::from(a as i16));
unop!(i64_extend32_s, i64 => i64, |a| i64::from(a as i32));

/* saturating truncation: `as` clamps and maps NaN to zero */
unop!(i32_trunc_sat_f32_s, f32 => i32, |a| a as i32);
unop!(i32_trunc_sat_f32_u, f32 => i32, |a| a as u32 as i32);
unop!(i32_trunc_sat_f64_s, f64 => i32, |a| a as i32);
unop!(i32_trunc_sat_f64_u, f64 => i32, |a| a as u32 as i32);
unop!(i64_trunc_sat_f32_s, f32 => i64, |a| a as i64);
unop!(i64_trunc_sat_f32_u, f32 => i64, |a| a as u64 as i64);
unop!(i64_trunc_sat_f64_s, f64 => i64, |a| a as i64);
unop!(i64_trunc_sat_f64_u, f64 => i64, |a| a as u64 as i64);
