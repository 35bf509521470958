use std::cmp::Ordering;

use crate::error::{RuntimeError, VmResult};
use crate::object::ObjId;
use crate::primitives::{arg, expect_integer, type_error, Arity, PrimitiveDesc};
use crate::runtime::Runtime;

pub fn integer_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("+", Arity::Exact(1), integer_add),
        PrimitiveDesc::new("-", Arity::Exact(1), integer_sub),
        PrimitiveDesc::new("*", Arity::Exact(1), integer_mul),
        PrimitiveDesc::new("/", Arity::Exact(1), integer_div),
        PrimitiveDesc::new("%", Arity::Exact(1), integer_mod),
        PrimitiveDesc::new("**", Arity::Exact(1), integer_pow),
        PrimitiveDesc::new("-@", Arity::Exact(0), integer_neg),
        PrimitiveDesc::new("==", Arity::Exact(1), integer_eq),
        PrimitiveDesc::new("<", Arity::Exact(1), integer_lt),
        PrimitiveDesc::new("<=", Arity::Exact(1), integer_le),
        PrimitiveDesc::new(">", Arity::Exact(1), integer_gt),
        PrimitiveDesc::new(">=", Arity::Exact(1), integer_ge),
        PrimitiveDesc::new("<=>", Arity::Exact(1), integer_cmp),
        PrimitiveDesc::new("to_s", Arity::Exact(0), integer_to_s),
        PrimitiveDesc::new("inspect", Arity::Exact(0), integer_to_s),
        PrimitiveDesc::new("zero?", Arity::Exact(0), integer_zero_p),
    ]
}

fn operands(
    rt: &Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<(i64, i64)> {
    let a = expect_integer(rt, receiver)?;
    let b = expect_integer(rt, arg(args, 0)?)?;
    Ok((a, b))
}

/// Quotient rounded towards negative infinity.
pub fn floor_div(a: i64, b: i64) -> VmResult<i64> {
    if b == 0 {
        return Err(RuntimeError::ZeroDivision);
    }
    let q = a.checked_div(b).ok_or(RuntimeError::IntegerOverflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Remainder with the sign of the divisor.
pub fn floor_mod(a: i64, b: i64) -> VmResult<i64> {
    if b == 0 {
        return Err(RuntimeError::ZeroDivision);
    }
    let r = a.checked_rem(b).ok_or(RuntimeError::IntegerOverflow)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

pub fn integer_add(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let (a, b) = operands(rt, receiver, args)?;
    let sum = a.checked_add(b).ok_or(RuntimeError::IntegerOverflow)?;
    Ok(rt.new_integer(sum))
}

pub fn integer_sub(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let (a, b) = operands(rt, receiver, args)?;
    let diff = a.checked_sub(b).ok_or(RuntimeError::IntegerOverflow)?;
    Ok(rt.new_integer(diff))
}

pub fn integer_mul(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let (a, b) = operands(rt, receiver, args)?;
    let prod = a.checked_mul(b).ok_or(RuntimeError::IntegerOverflow)?;
    Ok(rt.new_integer(prod))
}

pub fn integer_div(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let (a, b) = operands(rt, receiver, args)?;
    let quot = floor_div(a, b)?;
    Ok(rt.new_integer(quot))
}

pub fn integer_mod(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let (a, b) = operands(rt, receiver, args)?;
    let rem = floor_mod(a, b)?;
    Ok(rt.new_integer(rem))
}

pub fn integer_pow(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let (a, b) = operands(rt, receiver, args)?;
    // negative exponents produce rationals, which are not modelled
    let exp = u32::try_from(b).map_err(|_| RuntimeError::TypeError {
        expected: "non-negative Integer",
        got: b.to_string(),
    })?;
    let value = a.checked_pow(exp).ok_or(RuntimeError::IntegerOverflow)?;
    Ok(rt.new_integer(value))
}

pub fn integer_neg(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let a = expect_integer(rt, receiver)?;
    let neg = a.checked_neg().ok_or(RuntimeError::IntegerOverflow)?;
    Ok(rt.new_integer(neg))
}

pub fn integer_eq(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let a = expect_integer(rt, receiver)?;
    let equal = rt.integer_value(arg(args, 0)?) == Some(a);
    Ok(rt.bool(equal))
}

fn compare(
    rt: &Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<Ordering> {
    let a = expect_integer(rt, receiver)?;
    let other = arg(args, 0)?;
    let b = rt
        .integer_value(other)
        .ok_or_else(|| type_error(rt, "Integer", other))?;
    Ok(a.cmp(&b))
}

pub fn integer_lt(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let ord = compare(rt, receiver, args)?;
    Ok(rt.bool(ord.is_lt()))
}

pub fn integer_le(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let ord = compare(rt, receiver, args)?;
    Ok(rt.bool(ord.is_le()))
}

pub fn integer_gt(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let ord = compare(rt, receiver, args)?;
    Ok(rt.bool(ord.is_gt()))
}

pub fn integer_ge(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let ord = compare(rt, receiver, args)?;
    Ok(rt.bool(ord.is_ge()))
}

/// `nil` when the argument is not an integer.
pub fn integer_cmp(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let a = expect_integer(rt, receiver)?;
    match rt.integer_value(arg(args, 0)?) {
        Some(b) => Ok(rt.new_integer(a.cmp(&b) as i64)),
        None => Ok(rt.nil()),
    }
}

pub fn integer_to_s(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let a = expect_integer(rt, receiver)?;
    Ok(rt.new_string(a.to_string()))
}

pub fn integer_zero_p(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let a = expect_integer(rt, receiver)?;
    Ok(rt.bool(a == 0))
}
