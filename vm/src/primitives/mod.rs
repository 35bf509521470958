use crate::error::{RuntimeError, VmResult};
use crate::object::ObjId;
use crate::runtime::Runtime;

pub mod array;
pub mod class;
pub mod hash;
pub mod integer;
pub mod object;
pub mod range;
pub mod string;

pub type PrimitiveFn =
    fn(&mut Runtime<'_>, ObjId, &[ObjId]) -> VmResult<ObjId>;

/// How many arguments a primitive accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(u8),
    Any,
}

impl Arity {
    pub fn check(self, given: usize) -> VmResult<()> {
        match self {
            Arity::Exact(n) if n as usize != given => {
                Err(RuntimeError::ArgumentCount {
                    expected: n as usize,
                    given,
                })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Copy)]
pub struct PrimitiveDesc {
    pub name: &'static str,
    pub arity: Arity,
    pub func: PrimitiveFn,
}

impl PrimitiveDesc {
    pub const fn new(name: &'static str, arity: Arity, func: PrimitiveFn) -> Self {
        Self { name, arity, func }
    }
}

/// Install every builtin method into the runtime's builtin classes.
pub fn install(rt: &mut Runtime<'_>) {
    let special = *rt.special();
    let tables = [
        (special.object, object::object_primitives()),
        (special.nil_class, object::nil_primitives()),
        (special.true_class, object::true_primitives()),
        (special.false_class, object::false_primitives()),
        (special.class, class::class_primitives()),
        (special.class, class::module_primitives()),
        (special.module, class::module_primitives()),
        (special.integer, integer::integer_primitives()),
        (special.string, string::string_primitives()),
        (special.symbol, string::symbol_primitives()),
        (special.array, array::array_primitives()),
        (special.hash, hash::hash_primitives()),
        (special.range, range::range_primitives()),
    ];
    for (class, primitives) in tables {
        for desc in primitives {
            rt.define_native(class, desc);
        }
    }

    let main_class = rt.singleton_class_of(special.main);
    for desc in object::main_primitives() {
        rt.define_native(main_class, desc);
    }
}

/// The `idx`th argument. Arity has already been checked for fixed-arity
/// primitives; this guards the variadic ones.
#[inline]
pub(crate) fn arg(args: &[ObjId], idx: usize) -> VmResult<ObjId> {
    args.get(idx).copied().ok_or(RuntimeError::ArgumentCount {
        expected: idx + 1,
        given: args.len(),
    })
}

pub(crate) fn type_error(
    rt: &Runtime<'_>,
    expected: &'static str,
    value: ObjId,
) -> RuntimeError {
    RuntimeError::TypeError {
        expected,
        got: rt.class_name(rt.class_of(value)),
    }
}

#[inline]
pub(crate) fn expect_integer(rt: &Runtime<'_>, value: ObjId) -> VmResult<i64> {
    rt.integer_value(value)
        .ok_or_else(|| type_error(rt, "Integer", value))
}

#[inline]
pub(crate) fn expect_string(rt: &Runtime<'_>, value: ObjId) -> VmResult<String> {
    rt.str_value(value)
        .map(str::to_string)
        .ok_or_else(|| type_error(rt, "String", value))
}

/// A name given either as a symbol or a string.
pub(crate) fn expect_name(rt: &Runtime<'_>, value: ObjId) -> VmResult<String> {
    rt.symbol_name(value)
        .or_else(|| rt.str_value(value))
        .map(str::to_string)
        .ok_or_else(|| type_error(rt, "Symbol", value))
}

/// Render a collection's `inspect` string, answering `recursive` instead when
/// `receiver` is already being rendered further up (`a << a`).
pub(crate) fn inspect_guarded<'a>(
    rt: &mut Runtime<'a>,
    receiver: ObjId,
    recursive: &str,
    render: impl FnOnce(&mut Runtime<'a>) -> VmResult<String>,
) -> VmResult<ObjId> {
    if !rt.enter_inspect(receiver) {
        return Ok(rt.new_string(recursive));
    }
    let rendered = render(rt);
    rt.leave_inspect(receiver);
    Ok(rt.new_string(rendered?))
}
