use std::collections::HashMap;
use std::fmt;

use bytecode::Rep;

use crate::primitives::PrimitiveDesc;

/// Handle to an object in a [`Runtime`](crate::Runtime)'s arena.
///
/// Handles are only meaningful for the runtime that issued them. Objects are
/// never freed during a run, so a handle stays valid for the runtime's
/// whole lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(pub(crate) u32);

impl ObjId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The universal value representation.
///
/// Plain objects, classes and metaclasses all share this shape; a class is an
/// object whose payload is [`Payload::Class`] and whose own class is `Class`.
#[derive(Debug, Clone)]
pub struct MObj<'a> {
    pub class: ObjId,
    pub ivars: HashMap<String, ObjId>,
    /// Created on first request, at most once.
    pub singleton: Option<ObjId>,
    pub payload: Payload<'a>,
}

impl<'a> MObj<'a> {
    pub fn new(class: ObjId, payload: Payload<'a>) -> Self {
        Self {
            class,
            ivars: HashMap::new(),
            singleton: None,
            payload,
        }
    }

    pub fn class_data(&self) -> Option<&ClassData<'a>> {
        match &self.payload {
            Payload::Class(data) => Some(data),
            _ => None,
        }
    }

    pub fn class_data_mut(&mut self) -> Option<&mut ClassData<'a>> {
        match &mut self.payload {
            Payload::Class(data) => Some(data),
            _ => None,
        }
    }
}

/// Builtin content carried by an object.
#[derive(Debug, Clone)]
pub enum Payload<'a> {
    Plain,
    Integer(i64),
    String(String),
    Symbol(String),
    Array(Vec<ObjId>),
    /// Association list; keys compare by value for integers, strings and
    /// symbols, by identity otherwise.
    Hash(Vec<(ObjId, ObjId)>),
    Range {
        first: ObjId,
        last: ObjId,
        exclusive: bool,
    },
    Class(ClassData<'a>),
    /// A method body produced by the `METHOD` opcode, waiting for `DEF`.
    Method(Method<'a>),
}

#[derive(Debug, Clone)]
pub struct ClassData<'a> {
    pub name: String,
    pub superclass: Option<ObjId>,
    pub methods: HashMap<String, Method<'a>>,
    pub is_module: bool,
}

impl<'a> ClassData<'a> {
    pub fn new(name: impl Into<String>, superclass: Option<ObjId>) -> Self {
        Self {
            name: name.into(),
            superclass,
            methods: HashMap::new(),
            is_module: false,
        }
    }
}

/// An entry of a class's method table.
///
/// Builtin and user-defined methods live side by side and are called through
/// the same path.
#[derive(Clone)]
pub enum Method<'a> {
    Native(PrimitiveDesc),
    /// A method body compiled to bytecode.
    Bytecode(&'a Rep),
    /// `attr_reader`: returns the named instance variable.
    AttrReader(String),
    /// `attr_writer`: sets the named instance variable.
    AttrWriter(String),
}

impl fmt::Debug for Method<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Native(desc) => write!(f, "Native({})", desc.name),
            Method::Bytecode(rep) => {
                write!(f, "Bytecode({} instructions)", rep.instructions.len())
            }
            Method::AttrReader(ivar) => write!(f, "AttrReader({ivar})"),
            Method::AttrWriter(ivar) => write!(f, "AttrWriter({ivar})"),
        }
    }
}

/// A resolved method together with the class whose table held it.
#[derive(Debug, Clone)]
pub struct Found<'a> {
    pub owner: ObjId,
    pub method: Method<'a>,
}
