use crate::error::VmResult;
use crate::object::ObjId;
use crate::primitives::{arg, inspect_guarded, type_error, Arity, PrimitiveDesc};
use crate::runtime::Runtime;

pub fn hash_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("[]", Arity::Exact(1), hash_at),
        PrimitiveDesc::new("[]=", Arity::Exact(2), hash_at_put),
        PrimitiveDesc::new("length", Arity::Exact(0), hash_length),
        PrimitiveDesc::new("size", Arity::Exact(0), hash_length),
        PrimitiveDesc::new("key?", Arity::Exact(1), hash_key_p),
        PrimitiveDesc::new("keys", Arity::Exact(0), hash_keys),
        PrimitiveDesc::new("values", Arity::Exact(0), hash_values),
        PrimitiveDesc::new("empty?", Arity::Exact(0), hash_empty_p),
        PrimitiveDesc::new("inspect", Arity::Exact(0), hash_inspect),
        PrimitiveDesc::new("to_s", Arity::Exact(0), hash_inspect),
    ]
}

fn pairs(rt: &Runtime<'_>, receiver: ObjId) -> VmResult<Vec<(ObjId, ObjId)>> {
    rt.hash_pairs(receiver)
        .map(<[_]>::to_vec)
        .ok_or_else(|| type_error(rt, "Hash", receiver))
}

pub fn hash_at(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    pairs(rt, receiver)?;
    Ok(rt.hash_get(receiver, arg(args, 0)?).unwrap_or(rt.nil()))
}

pub fn hash_at_put(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    pairs(rt, receiver)?;
    let value = arg(args, 1)?;
    rt.hash_set(receiver, arg(args, 0)?, value);
    Ok(value)
}

pub fn hash_length(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let len = pairs(rt, receiver)?.len() as i64;
    Ok(rt.new_integer(len))
}

pub fn hash_key_p(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    pairs(rt, receiver)?;
    let found = rt.hash_get(receiver, arg(args, 0)?).is_some();
    Ok(rt.bool(found))
}

pub fn hash_keys(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let keys = pairs(rt, receiver)?.into_iter().map(|(k, _)| k).collect();
    Ok(rt.new_array(keys))
}

pub fn hash_values(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let values = pairs(rt, receiver)?.into_iter().map(|(_, v)| v).collect();
    Ok(rt.new_array(values))
}

pub fn hash_empty_p(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let empty = pairs(rt, receiver)?.is_empty();
    Ok(rt.bool(empty))
}

/// `{key=>value, ...}` in insertion order.
pub fn hash_inspect(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let pairs = pairs(rt, receiver)?;
    inspect_guarded(rt, receiver, "{...}", |rt| {
        let mut parts = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let key = rt.inspect(key)?;
            let value = rt.inspect(value)?;
            parts.push(format!("{key}=>{value}"));
        }
        Ok(format!("{{{}}}", parts.join(", ")))
    })
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn store_and_fetch() {
        let mut rt = Runtime::new(io::sink(), io::sink());
        let hash = rt.new_hash(vec![]);
        let key = rt.new_symbol("a");
        let one = rt.new_integer(1);
        rt.invoke(hash, "[]=", &[key, one]).unwrap();

        let same_key = rt.new_symbol("a");
        assert_eq!(rt.invoke(hash, "[]", &[same_key]), Ok(one));
        let other = rt.new_symbol("b");
        assert_eq!(rt.invoke(hash, "[]", &[other]), Ok(rt.nil()));
        let has = rt.invoke(hash, "key?", &[other]).unwrap();
        assert!(!rt.truthy(has));
    }

    #[test]
    fn inspect_keeps_insertion_order() {
        let mut rt = Runtime::new(io::sink(), io::sink());
        let b = rt.new_string("b");
        let a = rt.new_symbol("a");
        let one = rt.new_integer(1);
        let two = rt.new_integer(2);
        let hash = rt.new_hash(vec![(b, one), (a, two)]);
        assert_eq!(rt.inspect(hash).unwrap(), "{\"b\"=>1, :a=>2}");
        let keys = rt.invoke(hash, "keys", &[]).unwrap();
        assert_eq!(rt.inspect(keys).unwrap(), "[\"b\", :a]");
        let len = rt.invoke(hash, "size", &[]).unwrap();
        assert_eq!(rt.integer_value(len), Some(2));
    }

    #[test]
    fn self_containing_hash_inspects_as_ellipsis() {
        let mut rt = Runtime::new(io::sink(), io::sink());
        let hash = rt.new_hash(vec![]);
        let key = rt.new_symbol("me");
        rt.invoke(hash, "[]=", &[key, hash]).unwrap();
        assert_eq!(rt.inspect(hash).unwrap(), "{:me=>{...}}");
    }
}
