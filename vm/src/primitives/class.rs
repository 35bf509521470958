use crate::error::{RuntimeError, VmResult};
use crate::object::{Method, ObjId, Payload};
use crate::primitives::{expect_name, type_error, Arity, PrimitiveDesc};
use crate::runtime::Runtime;

pub fn class_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("new", Arity::Any, class_new),
        PrimitiveDesc::new("superclass", Arity::Exact(0), class_superclass),
    ]
}

/// Shared by classes and modules.
pub fn module_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("name", Arity::Exact(0), module_name),
        PrimitiveDesc::new("to_s", Arity::Exact(0), module_to_s),
        PrimitiveDesc::new("inspect", Arity::Exact(0), module_to_s),
        PrimitiveDesc::new("attr_reader", Arity::Any, module_attr_reader),
        PrimitiveDesc::new("attr_writer", Arity::Any, module_attr_writer),
        PrimitiveDesc::new("attr_accessor", Arity::Any, module_attr_accessor),
    ]
}

/// The payload a fresh instance of `class` starts with, decided by the
/// nearest builtin ancestor.
fn initial_payload<'a>(
    rt: &Runtime<'a>,
    class: ObjId,
) -> VmResult<Payload<'a>> {
    let special = *rt.special();
    let mut current = Some(class);
    let mut hops = 0;
    while let Some(c) = current {
        if c == special.string {
            return Ok(Payload::String(String::new()));
        }
        if c == special.array {
            return Ok(Payload::Array(Vec::new()));
        }
        if c == special.hash {
            return Ok(Payload::Hash(Vec::new()));
        }
        let immediate = [
            special.integer,
            special.symbol,
            special.range,
            special.proc,
            special.nil_class,
            special.true_class,
            special.false_class,
            special.class,
            special.module,
        ];
        if immediate.contains(&c) {
            return Err(RuntimeError::MethodNotFound {
                name: "new".to_string(),
                receiver: rt.describe(class),
            });
        }
        hops += 1;
        if hops > rt.config().max_class_depth {
            return Err(RuntimeError::ClassChainTooDeep(rt.class_name(class)));
        }
        current = rt.superclass_of(c);
    }
    Ok(Payload::Plain)
}

/// Allocate an instance, then send it `initialize` with the arguments.
pub fn class_new(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    match rt.class_data(receiver) {
        Some(data) if !data.is_module => {}
        _ => {
            return Err(RuntimeError::MethodNotFound {
                name: "new".to_string(),
                receiver: rt.describe(receiver),
            });
        }
    }
    let payload = initial_payload(rt, receiver)?;
    let obj = rt.new_object(receiver);
    rt.object_mut(obj).payload = payload;
    rt.invoke(obj, "initialize", args)?;
    Ok(obj)
}

pub fn class_superclass(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    Ok(rt.superclass_of(receiver).unwrap_or(rt.nil()))
}

pub fn module_name(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    _args: &[ObjId],
) -> VmResult<ObjId> {
    let name = rt
        .class_data(receiver)
        .map(|data| data.name.clone())
        .ok_or_else(|| type_error(rt, "Class", receiver))?;
    Ok(rt.new_string(name))
}

pub fn module_to_s(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    module_name(rt, receiver, args)
}

/// Define one attribute method per name. Names may be symbols or strings.
fn define_attrs(
    rt: &mut Runtime<'_>,
    class: ObjId,
    args: &[ObjId],
    reader: bool,
    writer: bool,
) -> VmResult<ObjId> {
    for &name in args {
        let name = expect_name(rt, name)?;
        let ivar = format!("@{name}");
        if reader {
            rt.define_method(class, name.clone(), Method::AttrReader(ivar.clone()))?;
        }
        if writer {
            rt.define_method(class, format!("{name}="), Method::AttrWriter(ivar))?;
        }
    }
    Ok(rt.nil())
}

pub fn module_attr_reader(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    define_attrs(rt, receiver, args, true, false)
}

pub fn module_attr_writer(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    define_attrs(rt, receiver, args, false, true)
}

pub fn module_attr_accessor(
    rt: &mut Runtime<'_>,
    receiver: ObjId,
    args: &[ObjId],
) -> VmResult<ObjId> {
    define_attrs(rt, receiver, args, true, true)
}
