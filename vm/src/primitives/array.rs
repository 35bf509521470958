use crate::error::{RuntimeError, VmResult};
use crate::object::ObjId;
use crate::primitives::{
    arg, expect_integer, inspect_guarded, type_error, Arity, PrimitiveDesc,
};
use crate::runtime::Runtime;

pub fn array_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("[]", Arity::Exact(1), array_at),
        PrimitiveDesc::new("[]=", Arity::Exact(2), array_at_put),
        PrimitiveDesc::new("length", Arity::Exact(0), array_length),
        PrimitiveDesc::new("size", Arity::Exact(0), array_length),
        PrimitiveDesc::new("push", Arity::Any, array_push),
        PrimitiveDesc::new("<<", Arity::Exact(1), array_push),
        PrimitiveDesc::new("first", Arity::Exact(0), array_first),
        PrimitiveDesc::new("last", Arity::Exact(0), array_last),
        PrimitiveDesc::new("+", Arity::Exact(1), array_concat),
        PrimitiveDesc::new("==", Arity::Exact(1), array_eq),
        PrimitiveDesc::new("inspect", Arity::Exact(0), array_inspect),
        PrimitiveDesc::new("to_s", Arity::Exact(0), array_inspect),
        PrimitiveDesc::new("empty?", Arity::Exact(0), array_empty_p),
    ]
}

fn items(rt: &Runtime<'_>, receiver: ObjId) -> VmResult<Vec<ObjId>> {
    rt.array_items(receiver)
        .map(<[ObjId]>::to_vec)
        .ok_or_else(|| type_error(rt, "Array", receiver))
}

/// Resolve a possibly negative index against `len`.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let idx = if index < 0 { index + len as i64 } else { index };
    usize::try_from(idx).ok()
}

pub fn array_at(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let index = expect_integer(rt, arg(args, 0)?)?;
    let items = items(rt, receiver)?;
    Ok(normalize_index(index, items.len())
        .and_then(|idx| items.get(idx).copied())
        .unwrap_or(rt.nil()))
}

/// Writing past the end pads with `nil`.
pub fn array_at_put(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let index = expect_integer(rt, arg(args, 0)?)?;
    let value = arg(args, 1)?;
    let nil = rt.nil();
    let got = type_error(rt, "Array", receiver);
    let items = rt.array_mut(receiver).ok_or(got)?;
    let len = items.len();
    let idx = normalize_index(index, len).ok_or(RuntimeError::IndexOutOfRange {
        kind: "array",
        index,
        len,
    })?;
    if idx >= len {
        items.resize(idx + 1, nil);
    }
    items[idx] = value;
    Ok(value)
}

pub fn array_length(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let len = items(rt, receiver)?.len() as i64;
    Ok(rt.new_integer(len))
}

/// Appends every argument; returns the receiver.
pub fn array_push(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let got = type_error(rt, "Array", receiver);
    rt.array_mut(receiver).ok_or(got)?.extend_from_slice(args);
    Ok(receiver)
}

pub fn array_first(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let first = items(rt, receiver)?.first().copied();
    Ok(first.unwrap_or(rt.nil()))
}

pub fn array_last(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let last = items(rt, receiver)?.last().copied();
    Ok(last.unwrap_or(rt.nil()))
}

pub fn array_concat(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let mut joined = items(rt, receiver)?;
    joined.extend(items(rt, arg(args, 0)?)?);
    Ok(rt.new_array(joined))
}

/// Element-wise `==`.
pub fn array_eq(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let lhs = items(rt, receiver)?;
    let Some(rhs) = rt.array_items(arg(args, 0)?).map(<[ObjId]>::to_vec) else {
        return Ok(rt.bool(false));
    };
    if lhs.len() != rhs.len() {
        return Ok(rt.bool(false));
    }
    for (a, b) in lhs.into_iter().zip(rhs) {
        let eq = rt.invoke(a, "==", &[b])?;
        if !rt.truthy(eq) {
            return Ok(rt.bool(false));
        }
    }
    Ok(rt.bool(true))
}

pub fn array_inspect(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let items = items(rt, receiver)?;
    inspect_guarded(rt, receiver, "[...]", |rt| {
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            parts.push(rt.inspect(item)?);
        }
        Ok(format!("[{}]", parts.join(", ")))
    })
}

pub fn array_empty_p(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let empty = items(rt, receiver)?.is_empty();
    Ok(rt.bool(empty))
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    fn ints(rt: &mut Runtime<'_>, values: &[i64]) -> ObjId {
        let items = values.iter().map(|&v| rt.new_integer(v)).collect();
        rt.new_array(items)
    }

    #[test]
    fn indexing() {
        let mut rt = Runtime::new(io::sink(), io::sink());
        let arr = ints(&mut rt, &[10, 20, 30]);
        for (index, expected) in [(0, Some(10)), (-1, Some(30)), (3, None), (-4, None)] {
            let idx = rt.new_integer(index);
            let value = rt.invoke(arr, "[]", &[idx]).unwrap();
            assert_eq!(rt.integer_value(value), expected, "index {index}");
        }
    }

    #[test]
    fn assignment_past_the_end_pads_with_nil() {
        let mut rt = Runtime::new(io::sink(), io::sink());
        let arr = ints(&mut rt, &[1]);
        let idx = rt.new_integer(3);
        let value = rt.new_integer(9);
        rt.invoke(arr, "[]=", &[idx, value]).unwrap();
        assert_eq!(rt.inspect(arr).unwrap(), "[1, nil, nil, 9]");

        let idx = rt.new_integer(-9);
        assert_eq!(
            rt.invoke(arr, "[]=", &[idx, value]),
            Err(RuntimeError::IndexOutOfRange {
                kind: "array",
                index: -9,
                len: 4
            })
        );
    }

    #[test]
    fn push_concat_and_compare() {
        let mut rt = Runtime::new(io::sink(), io::sink());
        let a = ints(&mut rt, &[1, 2]);
        let b = ints(&mut rt, &[3]);
        let four = rt.new_integer(4);
        assert_eq!(rt.invoke(b, "<<", &[four]), Ok(b));
        let c = rt.invoke(a, "+", &[b]).unwrap();
        assert_eq!(rt.inspect(c).unwrap(), "[1, 2, 3, 4]");

        let same = ints(&mut rt, &[1, 2, 3, 4]);
        let eq = rt.invoke(c, "==", &[same]).unwrap();
        assert!(rt.truthy(eq));
        let eq = rt.invoke(a, "==", &[same]).unwrap();
        assert!(!rt.truthy(eq));
    }

    #[test]
    fn nested_inspect() {
        let mut rt = Runtime::new(io::sink(), io::sink());
        let inner = ints(&mut rt, &[]);
        let s = rt.new_string("x");
        let sym = rt.new_symbol("y");
        let arr = rt.new_array(vec![inner, s, sym]);
        assert_eq!(rt.inspect(arr).unwrap(), "[[], \"x\", :y]");
        assert_eq!(rt.to_str(arr).unwrap(), "[[], \"x\", :y]");
    }

    #[test]
    fn self_containing_array_inspects_as_ellipsis() {
        let mut rt = Runtime::new(io::sink(), io::sink());
        let a = ints(&mut rt, &[]);
        rt.invoke(a, "<<", &[a]).unwrap();
        assert_eq!(rt.inspect(a).unwrap(), "[[...]]");

        // the marker is only for the array currently open
        let b = rt.new_array(vec![a, a]);
        assert_eq!(rt.inspect(b).unwrap(), "[[[...]], [[...]]]");
    }
}
