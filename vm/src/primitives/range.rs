use crate::error::VmResult;
use crate::object::{ObjId, Payload};
use crate::primitives::{expect_integer, type_error, Arity, PrimitiveDesc};
use crate::runtime::Runtime;

pub fn range_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("first", Arity::Exact(0), range_first),
        PrimitiveDesc::new("last", Arity::Exact(0), range_last),
        PrimitiveDesc::new("exclude_end?", Arity::Exact(0), range_exclude_end_p),
        PrimitiveDesc::new("to_a", Arity::Exact(0), range_to_a),
        PrimitiveDesc::new("inspect", Arity::Exact(0), range_inspect),
        PrimitiveDesc::new("to_s", Arity::Exact(0), range_to_s),
    ]
}

fn bounds(rt: &Runtime<'_>, receiver: ObjId) -> VmResult<(ObjId, ObjId, bool)> {
    match rt.object(receiver).payload {
        Payload::Range {
            first,
            last,
            exclusive,
        } => Ok((first, last, exclusive)),
        _ => Err(type_error(rt, "Range", receiver)),
    }
}

fn dots(exclusive: bool) -> &'static str {
    if exclusive { "..." } else { ".." }
}

pub fn range_first(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(bounds(rt, receiver)?.0)
}

pub fn range_last(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(bounds(rt, receiver)?.1)
}

pub fn range_exclude_end_p(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let exclusive = bounds(rt, receiver)?.2;
    Ok(rt.bool(exclusive))
}

/// Integer ranges only.
pub fn range_to_a(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let (first, last, exclusive) = bounds(rt, receiver)?;
    let first = expect_integer(rt, first)?;
    let last = expect_integer(rt, last)?;
    let items: Vec<ObjId> = if exclusive {
        (first..last).map(|i| rt.new_integer(i)).collect()
    } else {
        (first..=last).map(|i| rt.new_integer(i)).collect()
    };
    Ok(rt.new_array(items))
}

pub fn range_inspect(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let (first, last, exclusive) = bounds(rt, receiver)?;
    let first = rt.inspect(first)?;
    let last = rt.inspect(last)?;
    let s = format!("{first}{}{last}", dots(exclusive));
    Ok(rt.new_string(s))
}

pub fn range_to_s(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let (first, last, exclusive) = bounds(rt, receiver)?;
    let first = rt.to_str(first)?;
    let last = rt.to_str(last)?;
    let s = format!("{first}{}{last}", dots(exclusive));
    Ok(rt.new_string(s))
}
