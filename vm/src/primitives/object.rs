use crate::error::VmResult;
use crate::object::ObjId;
use crate::primitives::{arg, expect_name, Arity, PrimitiveDesc};
use crate::runtime::Runtime;

pub fn object_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("puts", Arity::Any, object_puts),
        PrimitiveDesc::new("print", Arity::Any, object_print),
        PrimitiveDesc::new("p", Arity::Any, object_p),
        PrimitiveDesc::new("warn", Arity::Any, object_warn),
        PrimitiveDesc::new("inspect", Arity::Exact(0), object_inspect),
        PrimitiveDesc::new("to_s", Arity::Exact(0), object_to_s),
        PrimitiveDesc::new("class", Arity::Exact(0), object_class),
        PrimitiveDesc::new("==", Arity::Exact(1), object_equal_p),
        PrimitiveDesc::new("equal?", Arity::Exact(1), object_equal_p),
        PrimitiveDesc::new("!=", Arity::Exact(1), object_ne),
        PrimitiveDesc::new("!", Arity::Exact(0), object_not),
        PrimitiveDesc::new("nil?", Arity::Exact(0), object_nil_p),
        PrimitiveDesc::new("respond_to?", Arity::Exact(1), object_respond_to_p),
        PrimitiveDesc::new("initialize", Arity::Exact(0), object_initialize),
        PrimitiveDesc::new(
            "instance_variable_get",
            Arity::Exact(1),
            object_ivar_get,
        ),
        PrimitiveDesc::new(
            "instance_variable_set",
            Arity::Exact(2),
            object_ivar_set,
        ),
    ]
}

pub fn nil_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("to_s", Arity::Exact(0), nil_to_s),
        PrimitiveDesc::new("inspect", Arity::Exact(0), nil_inspect),
        PrimitiveDesc::new("nil?", Arity::Exact(0), nil_nil_p),
        PrimitiveDesc::new("&", Arity::Exact(1), false_and),
        PrimitiveDesc::new("|", Arity::Exact(1), false_or),
    ]
}

pub fn true_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("to_s", Arity::Exact(0), true_to_s),
        PrimitiveDesc::new("inspect", Arity::Exact(0), true_to_s),
        PrimitiveDesc::new("&", Arity::Exact(1), true_and),
        PrimitiveDesc::new("|", Arity::Exact(1), true_or),
    ]
}

pub fn false_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("to_s", Arity::Exact(0), false_to_s),
        PrimitiveDesc::new("inspect", Arity::Exact(0), false_to_s),
        PrimitiveDesc::new("&", Arity::Exact(1), false_and),
        PrimitiveDesc::new("|", Arity::Exact(1), false_or),
    ]
}

/// Singleton methods of the top-level `self`.
pub fn main_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("to_s", Arity::Exact(0), main_to_s),
        PrimitiveDesc::new("inspect", Arity::Exact(0), main_to_s),
    ]
}

/// Arrays are flattened; every line ends in exactly one newline. `open`
/// holds the arrays being flattened, so one that contains itself prints
/// `[...]`.
fn puts_one(
    rt: &mut Runtime<'_>,
    value: ObjId,
    open: &mut Vec<ObjId>,
    out: &mut String,
) -> VmResult<()> {
    if let Some(items) = rt.array_items(value) {
        if open.contains(&value) {
            out.push_str("[...]\n");
            return Ok(());
        }
        let items = items.to_vec();
        open.push(value);
        for item in items {
            puts_one(rt, item, open, out)?;
        }
        open.pop();
        return Ok(());
    }
    let s = rt.to_str(value)?;
    out.push_str(&s);
    if !s.ends_with('\n') {
        out.push('\n');
    }
    Ok(())
}

pub fn object_puts(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let mut out = String::new();
    for &value in args {
        let before = out.len();
        puts_one(rt, value, &mut Vec::new(), &mut out)?;
        if out.len() == before {
            // empty array
            out.push('\n');
        }
    }
    if args.is_empty() {
        out.push('\n');
    }
    rt.write_out(&out)?;
    Ok(rt.nil())
}

pub fn object_print(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    for &value in args {
        let s = rt.to_str(value)?;
        rt.write_out(&s)?;
    }
    Ok(rt.nil())
}

/// Writes `inspect` of each argument; returns the argument, or an array of
/// them when given several.
pub fn object_p(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    for &value in args {
        let mut s = rt.inspect(value)?;
        s.push('\n');
        rt.write_out(&s)?;
    }
    Ok(match args {
        [] => rt.nil(),
        [one] => *one,
        many => rt.new_array(many.to_vec()),
    })
}

pub fn object_warn(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    for &value in args {
        let mut s = rt.to_str(value)?;
        if !s.ends_with('\n') {
            s.push('\n');
        }
        rt.write_err(&s)?;
    }
    Ok(rt.nil())
}

/// `#<Foo>`, or `#<Foo @a=1, @b=2>` when instance variables are set.
pub fn object_inspect(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let mut ivars: Vec<(String, ObjId)> = rt
        .object(receiver)
        .ivars
        .iter()
        .map(|(name, value)| (name.clone(), *value))
        .collect();
    if ivars.is_empty() || rt.is_class(receiver) {
        return object_to_s(rt, receiver, &[]);
    }
    ivars.sort();

    let mut parts = Vec::with_capacity(ivars.len());
    for (name, value) in ivars {
        parts.push(format!("{name}={}", rt.inspect(value)?));
    }
    let class = rt.class_name(rt.class_of(receiver));
    Ok(rt.new_string(format!("#<{class} {}>", parts.join(", "))))
}

pub fn object_to_s(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let s = rt.any_to_s(receiver);
    Ok(rt.new_string(s))
}

pub fn object_class(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.class_of(receiver))
}

pub fn object_equal_p(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.bool(receiver == arg(args, 0)?))
}

pub fn object_ne(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let eq = rt.invoke(receiver, "==", &[arg(args, 0)?])?;
    Ok(rt.bool(!rt.truthy(eq)))
}

pub fn object_not(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.bool(!rt.truthy(receiver)))
}

pub fn object_nil_p(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.bool(false))
}

pub fn object_respond_to_p(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let name = expect_name(rt, arg(args, 0)?)?;
    Ok(rt.bool(rt.respond_to(receiver, &name)))
}

pub fn object_initialize(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.nil())
}

pub fn object_ivar_get(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let name = expect_name(rt, arg(args, 0)?)?;
    Ok(rt.ivar_get(receiver, &name))
}

pub fn object_ivar_set(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let name = expect_name(rt, arg(args, 0)?)?;
    let value = arg(args, 1)?;
    rt.ivar_set(receiver, &name, value);
    Ok(value)
}

pub fn nil_to_s(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.new_string(""))
}

pub fn nil_inspect(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.new_string("nil"))
}

pub fn nil_nil_p(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.bool(true))
}

pub fn true_to_s(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.new_string("true"))
}

pub fn false_to_s(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.new_string("false"))
}

pub fn true_and(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.bool(rt.truthy(arg(args, 0)?)))
}

pub fn true_or(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.bool(true))
}

/// `&` for `nil` and `false`.
pub fn false_and(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.bool(false))
}

/// `|` for `nil` and `false`.
pub fn false_or(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.bool(rt.truthy(arg(args, 0)?)))
}

pub fn main_to_s(
    rt: &mut Runtime<'_>,
    _receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.new_string("main"))
}
