use std::fmt::Write as _;

use crate::error::{RuntimeError, VmResult};
use crate::object::ObjId;
use crate::primitives::{
    arg, expect_integer, expect_string, type_error, Arity, PrimitiveDesc,
};
use crate::runtime::Runtime;

pub fn string_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("+", Arity::Exact(1), string_concat),
        PrimitiveDesc::new("*", Arity::Exact(1), string_repeat),
        PrimitiveDesc::new("==", Arity::Exact(1), string_eq),
        PrimitiveDesc::new("<", Arity::Exact(1), string_lt),
        PrimitiveDesc::new("<=", Arity::Exact(1), string_le),
        PrimitiveDesc::new(">", Arity::Exact(1), string_gt),
        PrimitiveDesc::new(">=", Arity::Exact(1), string_ge),
        PrimitiveDesc::new("length", Arity::Exact(0), string_length),
        PrimitiveDesc::new("size", Arity::Exact(0), string_length),
        PrimitiveDesc::new("empty?", Arity::Exact(0), string_empty_p),
        PrimitiveDesc::new("to_s", Arity::Exact(0), string_to_s),
        PrimitiveDesc::new("to_sym", Arity::Exact(0), string_to_sym),
        PrimitiveDesc::new("inspect", Arity::Exact(0), string_inspect),
        PrimitiveDesc::new("upcase", Arity::Exact(0), string_upcase),
        PrimitiveDesc::new("downcase", Arity::Exact(0), string_downcase),
    ]
}

pub fn symbol_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("to_s", Arity::Exact(0), symbol_to_s),
        PrimitiveDesc::new("to_sym", Arity::Exact(0), symbol_to_sym),
        PrimitiveDesc::new("inspect", Arity::Exact(0), symbol_inspect),
        PrimitiveDesc::new("==", Arity::Exact(1), symbol_eq),
        PrimitiveDesc::new("length", Arity::Exact(0), symbol_length),
    ]
}

/// Double-quoted form with backslash escapes.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0b' => out.push_str("\\v"),
            '\x0c' => out.push_str("\\f"),
            '\x1b' => out.push_str("\\e"),
            '#' if matches!(chars.peek(), Some('{' | '$' | '@')) => {
                out.push_str("\\#")
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `:name`, quoted when the name is not a plain identifier or operator.
pub fn symbol_literal(name: &str) -> String {
    const OPERATORS: &[&str] = &[
        "+", "-", "*", "/", "%", "**", "==", "!=", "<", "<=", ">", ">=",
        "<=>", "===", "=~", "!", "[]", "[]=", "<<", ">>", "&", "|", "^", "~",
        "+@", "-@",
    ];
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            let rest = chars.as_str();
            let body = rest.trim_end_matches(['?', '!', '=']);
            body.chars().all(|c| c.is_alphanumeric() || c == '_')
                && rest.len() - body.len() <= 1
        }
        Some('@' | '$') => {
            let rest = name.trim_start_matches('@').trim_start_matches('$');
            !rest.is_empty()
                && rest.chars().all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => OPERATORS.contains(&name),
    };
    if plain {
        format!(":{name}")
    } else {
        format!(":{}", quote(name))
    }
}

fn receiver_str<'r>(rt: &'r Runtime<'_>, receiver: ObjId) -> VmResult<&'r str> {
    rt.str_value(receiver)
        .ok_or_else(|| type_error(rt, "String", receiver))
}

pub fn string_concat(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let rhs = expect_string(rt, arg(args, 0)?)?;
    let mut s = receiver_str(rt, receiver)?.to_string();
    s.push_str(&rhs);
    Ok(rt.new_string(s))
}

pub fn string_repeat(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let times = expect_integer(rt, arg(args, 0)?)?;
    let times = usize::try_from(times).map_err(|_| RuntimeError::TypeError {
        expected: "non-negative Integer",
        got: times.to_string(),
    })?;
    let s = receiver_str(rt, receiver)?.repeat(times);
    Ok(rt.new_string(s))
}

pub fn string_eq(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let equal = rt.str_value(arg(args, 0)?) == Some(receiver_str(rt, receiver)?);
    Ok(rt.bool(equal))
}

fn compare(
    rt: &Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<std::cmp::Ordering> {
    let a = receiver_str(rt, receiver)?;
    let other = arg(args, 0)?;
    let b = rt
        .str_value(other)
        .ok_or_else(|| type_error(rt, "String", other))?;
    Ok(a.cmp(b))
}

pub fn string_lt(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let ord = compare(rt, receiver, args)?;
    Ok(rt.bool(ord.is_lt()))
}

pub fn string_le(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let ord = compare(rt, receiver, args)?;
    Ok(rt.bool(ord.is_le()))
}

pub fn string_gt(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let ord = compare(rt, receiver, args)?;
    Ok(rt.bool(ord.is_gt()))
}

pub fn string_ge(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let ord = compare(rt, receiver, args)?;
    Ok(rt.bool(ord.is_ge()))
}

/// Length in characters.
pub fn string_length(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let len = receiver_str(rt, receiver)?.chars().count() as i64;
    Ok(rt.new_integer(len))
}

pub fn string_empty_p(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let empty = receiver_str(rt, receiver)?.is_empty();
    Ok(rt.bool(empty))
}

pub fn string_to_s(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    receiver_str(rt, receiver)?;
    Ok(receiver)
}

pub fn string_to_sym(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let name = receiver_str(rt, receiver)?.to_string();
    Ok(rt.new_symbol(name))
}

pub fn string_inspect(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let quoted = quote(receiver_str(rt, receiver)?);
    Ok(rt.new_string(quoted))
}

pub fn string_upcase(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let s = receiver_str(rt, receiver)?.to_uppercase();
    Ok(rt.new_string(s))
}

pub fn string_downcase(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let s = receiver_str(rt, receiver)?.to_lowercase();
    Ok(rt.new_string(s))
}

fn receiver_symbol(rt: &Runtime<'_>, receiver: ObjId) -> VmResult<String> {
    rt.symbol_name(receiver)
        .map(str::to_string)
        .ok_or_else(|| type_error(rt, "Symbol", receiver))
}

pub fn symbol_to_s(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let name = receiver_symbol(rt, receiver)?;
    Ok(rt.new_string(name))
}

pub fn symbol_to_sym(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    receiver_symbol(rt, receiver)?;
    Ok(receiver)
}

pub fn symbol_inspect(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let name = receiver_symbol(rt, receiver)?;
    Ok(rt.new_string(symbol_literal(&name)))
}

/// Symbols with the same name are equal even when loaded separately.
pub fn symbol_eq(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let name = receiver_symbol(rt, receiver)?;
    let equal = rt.symbol_name(arg(args, 0)?) == Some(name.as_str());
    Ok(rt.bool(equal))
}

pub fn symbol_length(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let len = receiver_symbol(rt, receiver)?.chars().count() as i64;
    Ok(rt.new_integer(len))
}
