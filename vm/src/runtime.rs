use std::collections::{HashMap, HashSet};
use std::io::Write;

use bytecode::{Image, Rep};
use log::{debug, trace};

use crate::config::VmConfig;
use crate::error::{RuntimeError, VmResult};
use crate::interpreter::{self, Context};
use crate::object::{ClassData, Found, MObj, Method, ObjId, Payload};
use crate::primitives::{self, PrimitiveDesc};
use crate::special::{self, SpecialObjects};

/// The object world of one run: the object arena, builtin classes, globals,
/// constants and the output sinks.
///
/// Nothing here is process-global. Two runtimes never share objects, so
/// independent runs may proceed on separate threads.
pub struct Runtime<'a> {
    objects: Vec<MObj<'a>>,
    special: SpecialObjects,
    globals: HashMap<String, ObjId>,
    constants: HashMap<String, ObjId>,
    out: Box<dyn Write + 'a>,
    err: Box<dyn Write + 'a>,
    config: VmConfig,
    depth: usize,
    /// Collections whose `inspect` is in progress.
    inspecting: HashSet<ObjId>,
}

impl<'a> Runtime<'a> {
    pub fn new(out: impl Write + 'a, err: impl Write + 'a) -> Self {
        Self::with_config(out, err, VmConfig::default())
    }

    pub fn with_config(
        out: impl Write + 'a,
        err: impl Write + 'a,
        config: VmConfig,
    ) -> Self {
        let mut objects = Vec::with_capacity(64);
        let special = special::bootstrap(&mut objects);
        let mut rt = Self {
            objects,
            special,
            globals: HashMap::new(),
            constants: HashMap::new(),
            out: Box::new(out),
            err: Box::new(err),
            config,
            depth: 0,
            inspecting: HashSet::new(),
        };
        for (name, class) in special.classes() {
            rt.constants.insert(name.to_string(), class);
        }
        primitives::install(&mut rt);
        debug!("runtime bootstrapped with {} objects", rt.objects.len());
        rt
    }

    /// Execute every root record of `image` in file order and return the
    /// value of the last one.
    pub fn execute(&mut self, image: &'a Image) -> VmResult<ObjId> {
        let mut result = self.nil();
        for (idx, rep) in image.records.iter().enumerate() {
            debug!("executing root record {idx}");
            result = self.execute_rep(rep)?;
        }
        Ok(result)
    }

    /// Execute one record as top-level code: `self` is `main` and the
    /// target class is `Object`.
    pub fn execute_rep(&mut self, rep: &'a Rep) -> VmResult<ObjId> {
        let ctx = Context::top_level(self.special.main, self.special.object);
        interpreter::eval(self, rep, ctx, &[])
    }

    #[inline]
    pub fn special(&self) -> &SpecialObjects {
        &self.special
    }

    #[inline]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    #[inline]
    pub fn nil(&self) -> ObjId {
        self.special.nil
    }

    #[inline]
    pub fn main(&self) -> ObjId {
        self.special.main
    }

    #[inline]
    pub fn bool(&self, value: bool) -> ObjId {
        if value {
            self.special.true_obj
        } else {
            self.special.false_obj
        }
    }

    /// Only `nil` and `false` are falsy.
    #[inline]
    pub fn truthy(&self, value: ObjId) -> bool {
        value != self.special.nil && value != self.special.false_obj
    }

    #[inline]
    pub fn object(&self, id: ObjId) -> &MObj<'a> {
        &self.objects[id.index()]
    }

    #[inline]
    pub fn object_mut(&mut self, id: ObjId) -> &mut MObj<'a> {
        &mut self.objects[id.index()]
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn alloc(&mut self, class: ObjId, payload: Payload<'a>) -> ObjId {
        let id = ObjId(self.objects.len() as u32);
        self.objects.push(MObj::new(class, payload));
        id
    }

    // constructors

    pub fn new_object(&mut self, class: ObjId) -> ObjId {
        self.alloc(class, Payload::Plain)
    }

    pub fn new_integer(&mut self, value: i64) -> ObjId {
        self.alloc(self.special.integer, Payload::Integer(value))
    }

    pub fn new_string(&mut self, value: impl Into<String>) -> ObjId {
        self.alloc(self.special.string, Payload::String(value.into()))
    }

    pub fn new_symbol(&mut self, name: impl Into<String>) -> ObjId {
        self.alloc(self.special.symbol, Payload::Symbol(name.into()))
    }

    pub fn new_array(&mut self, items: Vec<ObjId>) -> ObjId {
        self.alloc(self.special.array, Payload::Array(items))
    }

    pub fn new_hash(&mut self, pairs: Vec<(ObjId, ObjId)>) -> ObjId {
        let hash = self.alloc(self.special.hash, Payload::Hash(Vec::new()));
        for (key, value) in pairs {
            self.hash_set(hash, key, value);
        }
        hash
    }

    pub fn new_range(
        &mut self,
        first: ObjId,
        last: ObjId,
        exclusive: bool,
    ) -> ObjId {
        self.alloc(
            self.special.range,
            Payload::Range {
                first,
                last,
                exclusive,
            },
        )
    }

    pub fn new_method(&mut self, method: Method<'a>) -> ObjId {
        self.alloc(self.special.proc, Payload::Method(method))
    }

    /// Create a class object. Binding it to a constant is up to the caller.
    pub fn define_class(&mut self, name: &str, superclass: ObjId) -> ObjId {
        trace!("define class {name} < {}", self.class_name(superclass));
        self.alloc(
            self.special.class,
            Payload::Class(ClassData::new(name, Some(superclass))),
        )
    }

    pub fn define_module(&mut self, name: &str) -> ObjId {
        let mut data = ClassData::new(name, None);
        data.is_module = true;
        self.alloc(self.special.module, Payload::Class(data))
    }

    pub fn define_method(
        &mut self,
        class: ObjId,
        name: impl Into<String>,
        method: Method<'a>,
    ) -> VmResult<()> {
        let got = self.class_name(self.class_of(class));
        let data = self
            .object_mut(class)
            .class_data_mut()
            .ok_or(RuntimeError::TypeError {
                expected: "Class",
                got,
            })?;
        data.methods.insert(name.into(), method);
        Ok(())
    }

    /// Register a builtin. Silently ignored if `class` is not a class.
    pub(crate) fn define_native(&mut self, class: ObjId, desc: PrimitiveDesc) {
        if let Some(data) = self.object_mut(class).class_data_mut() {
            data.methods.insert(desc.name.to_string(), Method::Native(desc));
        }
    }

    pub fn undef_method(&mut self, class: ObjId, name: &str) -> VmResult<()> {
        let receiver = self.describe(class);
        let removed = self
            .object_mut(class)
            .class_data_mut()
            .and_then(|data| data.methods.remove(name));
        match removed {
            Some(_) => Ok(()),
            None => Err(RuntimeError::MethodNotFound {
                name: name.to_string(),
                receiver,
            }),
        }
    }

    // payload access

    pub fn integer_value(&self, id: ObjId) -> Option<i64> {
        match self.object(id).payload {
            Payload::Integer(value) => Some(value),
            _ => None,
        }
    }

    pub fn str_value(&self, id: ObjId) -> Option<&str> {
        match &self.object(id).payload {
            Payload::String(value) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn string_mut(&mut self, id: ObjId) -> Option<&mut String> {
        match &mut self.object_mut(id).payload {
            Payload::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn symbol_name(&self, id: ObjId) -> Option<&str> {
        match &self.object(id).payload {
            Payload::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn array_items(&self, id: ObjId) -> Option<&[ObjId]> {
        match &self.object(id).payload {
            Payload::Array(items) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn array_mut(&mut self, id: ObjId) -> Option<&mut Vec<ObjId>> {
        match &mut self.object_mut(id).payload {
            Payload::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn hash_pairs(&self, id: ObjId) -> Option<&[(ObjId, ObjId)]> {
        match &self.object(id).payload {
            Payload::Hash(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn class_data(&self, id: ObjId) -> Option<&ClassData<'a>> {
        self.object(id).class_data()
    }

    #[inline]
    pub fn is_class(&self, id: ObjId) -> bool {
        self.class_data(id).is_some()
    }

    /// The real class of `obj`; singleton classes are not reported.
    #[inline]
    pub fn class_of(&self, obj: ObjId) -> ObjId {
        self.object(obj).class
    }

    pub fn superclass_of(&self, class: ObjId) -> Option<ObjId> {
        self.class_data(class).and_then(|data| data.superclass)
    }

    pub fn class_name(&self, class: ObjId) -> String {
        match self.class_data(class) {
            Some(data) => data.name.clone(),
            None => "?".to_string(),
        }
    }

    /// How `obj` is named in error messages.
    pub fn describe(&self, obj: ObjId) -> String {
        if obj == self.special.nil {
            "nil".to_string()
        } else if obj == self.special.true_obj {
            "true".to_string()
        } else if obj == self.special.false_obj {
            "false".to_string()
        } else if obj == self.special.main {
            "main:Object".to_string()
        } else if let Some(data) = self.class_data(obj) {
            let kind = if data.is_module { "module" } else { "class" };
            format!("{kind} {}", data.name)
        } else {
            format!("an instance of {}", self.class_name(self.class_of(obj)))
        }
    }

    // instance variables, globals, constants

    pub fn ivar_get(&self, obj: ObjId, name: &str) -> ObjId {
        self.object(obj)
            .ivars
            .get(name)
            .copied()
            .unwrap_or(self.special.nil)
    }

    pub fn ivar_set(&mut self, obj: ObjId, name: &str, value: ObjId) {
        self.object_mut(obj).ivars.insert(name.to_string(), value);
    }

    /// Unset globals read as `nil`.
    pub fn global(&self, name: &str) -> ObjId {
        self.globals.get(name).copied().unwrap_or(self.special.nil)
    }

    pub fn set_global(&mut self, name: &str, value: ObjId) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn constant(&self, name: &str) -> Option<ObjId> {
        self.constants.get(name).copied()
    }

    pub fn set_constant(&mut self, name: &str, value: ObjId) {
        self.constants.insert(name.to_string(), value);
    }

    // hashes

    /// Keys compare by value for integers, strings and symbols, by identity
    /// for everything else.
    pub fn keys_equal(&self, a: ObjId, b: ObjId) -> bool {
        if a == b {
            return true;
        }
        match (&self.object(a).payload, &self.object(b).payload) {
            (Payload::Integer(x), Payload::Integer(y)) => x == y,
            (Payload::String(x), Payload::String(y)) => x == y,
            (Payload::Symbol(x), Payload::Symbol(y)) => x == y,
            _ => false,
        }
    }

    pub fn hash_get(&self, hash: ObjId, key: ObjId) -> Option<ObjId> {
        self.hash_pairs(hash)?
            .iter()
            .find(|(k, _)| self.keys_equal(*k, key))
            .map(|(_, v)| *v)
    }

    /// Insert or replace; insertion order is kept for new keys.
    pub(crate) fn hash_set(&mut self, hash: ObjId, key: ObjId, value: ObjId) {
        let existing = self.hash_pairs(hash).and_then(|pairs| {
            pairs.iter().position(|(k, _)| self.keys_equal(*k, key))
        });
        if let Payload::Hash(pairs) = &mut self.object_mut(hash).payload {
            match existing {
                Some(idx) => pairs[idx].1 = value,
                None => pairs.push((key, value)),
            }
        }
    }

    // dispatch

    /// The singleton class of `obj`, created on first request.
    ///
    /// A singleton class is an instance of `Class` inheriting from `Class`.
    /// Asking again returns the same handle.
    pub fn singleton_class_of(&mut self, obj: ObjId) -> ObjId {
        if let Some(singleton) = self.object(obj).singleton {
            return singleton;
        }
        let name = match self.class_data(obj) {
            Some(data) => format!("(singleton of {})", data.name),
            None => "(singleton)".to_string(),
        };
        let singleton = self.alloc(
            self.special.class,
            Payload::Class(ClassData::new(name, Some(self.special.class))),
        );
        self.object_mut(obj).singleton = Some(singleton);
        trace!("created singleton class {singleton:?} for {obj:?}");
        singleton
    }

    /// Resolve `name` for `obj`: the singleton class's own table first, then
    /// the class chain from the object's class upwards.
    pub fn lookup_method(&self, obj: ObjId, name: &str) -> VmResult<Found<'a>> {
        if let Some(singleton) = self.object(obj).singleton {
            if let Some(method) = self
                .class_data(singleton)
                .and_then(|data| data.methods.get(name))
            {
                return Ok(Found {
                    owner: singleton,
                    method: method.clone(),
                });
            }
        }
        self.lookup_from(Some(self.class_of(obj)), name)?
            .ok_or_else(|| RuntimeError::MethodNotFound {
                name: name.to_string(),
                receiver: self.describe(obj),
            })
    }

    /// Walk the class chain starting at `start`.
    pub fn lookup_from(
        &self,
        start: Option<ObjId>,
        name: &str,
    ) -> VmResult<Option<Found<'a>>> {
        let mut current = start;
        let mut hops = 0;
        while let Some(class) = current {
            let Some(data) = self.class_data(class) else {
                return Err(RuntimeError::TypeError {
                    expected: "Class",
                    got: self.class_name(self.class_of(class)),
                });
            };
            if let Some(method) = data.methods.get(name) {
                return Ok(Some(Found {
                    owner: class,
                    method: method.clone(),
                }));
            }
            hops += 1;
            if hops > self.config.max_class_depth {
                return Err(RuntimeError::ClassChainTooDeep(data.name.clone()));
            }
            current = data.superclass;
        }
        Ok(None)
    }

    pub fn respond_to(&self, obj: ObjId, name: &str) -> bool {
        self.lookup_method(obj, name).is_ok()
    }

    /// Send `name` to `receiver`. Every call, builtin or bytecode, goes
    /// through here.
    pub fn invoke(
        &mut self,
        receiver: ObjId,
        name: &str,
        args: &[ObjId],
    ) -> VmResult<ObjId> {
        let found = self.lookup_method(receiver, name)?;
        self.call_found(receiver, found, name, args)
    }

    pub(crate) fn call_found(
        &mut self,
        receiver: ObjId,
        found: Found<'a>,
        name: &str,
        args: &[ObjId],
    ) -> VmResult<ObjId> {
        if self.depth >= self.config.max_call_depth {
            return Err(RuntimeError::StackTooDeep);
        }
        trace!("send {name} to {receiver:?} with {} args", args.len());

        self.depth += 1;
        let result = match found.method {
            Method::Native(desc) => desc
                .arity
                .check(args.len())
                .and_then(|()| (desc.func)(self, receiver, args)),
            Method::Bytecode(rep) => {
                let ctx = Context::method(receiver, found.owner, name);
                interpreter::eval(self, rep, ctx, args)
            }
            Method::AttrReader(ivar) => check_argc(0, args.len())
                .map(|()| self.ivar_get(receiver, &ivar)),
            Method::AttrWriter(ivar) => {
                check_argc(1, args.len()).map(|()| {
                    self.ivar_set(receiver, &ivar, args[0]);
                    args[0]
                })
            }
        };
        self.depth -= 1;
        result
    }

    /// Mark `obj` as being inspected. False when it already is, meaning a
    /// collection contains itself.
    pub(crate) fn enter_inspect(&mut self, obj: ObjId) -> bool {
        self.inspecting.insert(obj)
    }

    pub(crate) fn leave_inspect(&mut self, obj: ObjId) {
        self.inspecting.remove(&obj);
    }

    // conversions

    /// `obj.to_s` as a Rust string.
    pub fn to_str(&mut self, obj: ObjId) -> VmResult<String> {
        let s = self.invoke(obj, "to_s", &[])?;
        Ok(match self.str_value(s) {
            Some(value) => value.to_string(),
            None => self.any_to_s(obj),
        })
    }

    /// `obj.inspect` as a Rust string.
    pub fn inspect(&mut self, obj: ObjId) -> VmResult<String> {
        let s = self.invoke(obj, "inspect", &[])?;
        Ok(match self.str_value(s) {
            Some(value) => value.to_string(),
            None => self.any_to_s(obj),
        })
    }

    /// Fallback representation: `#<ClassName>`.
    pub fn any_to_s(&self, obj: ObjId) -> String {
        format!("#<{}>", self.class_name(self.class_of(obj)))
    }

    // output

    pub fn write_out(&mut self, text: &str) -> VmResult<()> {
        self.out.write_all(text.as_bytes())?;
        Ok(())
    }

    pub fn write_err(&mut self, text: &str) -> VmResult<()> {
        self.err.write_all(text.as_bytes())?;
        Ok(())
    }

    pub fn flush(&mut self) -> VmResult<()> {
        self.out.flush()?;
        self.err.flush()?;
        Ok(())
    }
}

pub(crate) fn check_argc(expected: usize, given: usize) -> VmResult<()> {
    if expected == given {
        Ok(())
    } else {
        Err(RuntimeError::ArgumentCount { expected, given })
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::primitives::Arity;

    fn runtime() -> Runtime<'static> {
        Runtime::new(io::sink(), io::sink())
    }

    fn answer(
        rt: &mut Runtime<'_>,
        _receiver: ObjId,
        _args: &[ObjId],
    ) -> VmResult<ObjId> {
        Ok(rt.new_integer(42))
    }

    fn other(
        rt: &mut Runtime<'_>,
        _receiver: ObjId,
        _args: &[ObjId],
    ) -> VmResult<ObjId> {
        Ok(rt.new_integer(7))
    }

    #[test]
    fn singleton_creation_is_idempotent() {
        let mut rt = runtime();
        let obj = rt.new_object(rt.special().object);
        let first = rt.singleton_class_of(obj);
        let count = rt.object_count();
        let second = rt.singleton_class_of(obj);
        assert_eq!(first, second);
        assert_eq!(rt.object_count(), count);
        assert_eq!(rt.class_of(first), rt.special().class);
        assert_eq!(rt.superclass_of(first), Some(rt.special().class));
        assert_eq!(rt.class_name(first), "(singleton)");
    }

    #[test]
    fn singleton_of_class_is_named_after_it() {
        let mut rt = runtime();
        let class = rt.special().class;
        let singleton = rt.singleton_class_of(class);
        assert_eq!(rt.class_name(singleton), "(singleton of Class)");
        assert_eq!(rt.singleton_class_of(class), singleton);
    }

    #[test]
    fn inherited_methods_are_found_in_the_superclass() {
        let mut rt = runtime();
        let base = rt.define_class("Base", rt.special().object);
        let derived = rt.define_class("Derived", base);
        rt.define_native(base, PrimitiveDesc::new("answer", Arity::Exact(0), answer));

        let obj = rt.new_object(derived);
        let found = rt.lookup_method(obj, "answer").unwrap();
        assert_eq!(found.owner, base);
        let value = rt.invoke(obj, "answer", &[]).unwrap();
        assert_eq!(rt.integer_value(value), Some(42));
    }

    #[test]
    fn singleton_methods_shadow_the_class() {
        let mut rt = runtime();
        let class = rt.define_class("Foo", rt.special().object);
        rt.define_native(class, PrimitiveDesc::new("answer", Arity::Exact(0), answer));
        let plain = rt.new_object(class);
        let special = rt.new_object(class);
        let singleton = rt.singleton_class_of(special);
        rt.define_native(singleton, PrimitiveDesc::new("answer", Arity::Exact(0), other));

        let a = rt.invoke(plain, "answer", &[]).unwrap();
        let b = rt.invoke(special, "answer", &[]).unwrap();
        assert_eq!(rt.integer_value(a), Some(42));
        assert_eq!(rt.integer_value(b), Some(7));
    }

    #[test]
    fn missing_method_names_the_receiver() {
        let mut rt = runtime();
        let class = rt.define_class("Foo", rt.special().object);
        let obj = rt.new_object(class);
        assert_eq!(
            rt.invoke(obj, "frob", &[]),
            Err(RuntimeError::MethodNotFound {
                name: "frob".into(),
                receiver: "an instance of Foo".into(),
            })
        );
        let nil = rt.nil();
        assert!(matches!(
            rt.invoke(nil, "frob", &[]),
            Err(RuntimeError::MethodNotFound { receiver, .. }) if receiver == "nil"
        ));
    }

    #[test]
    fn native_arity_is_checked() {
        let mut rt = runtime();
        let one = rt.new_integer(1);
        assert_eq!(
            rt.invoke(one, "+", &[]),
            Err(RuntimeError::ArgumentCount {
                expected: 1,
                given: 0
            })
        );
    }

    #[test]
    fn attr_methods_use_instance_variables() {
        let mut rt = runtime();
        let class = rt.define_class("Point", rt.special().object);
        rt.define_method(class, "x", Method::AttrReader("@x".into())).unwrap();
        rt.define_method(class, "x=", Method::AttrWriter("@x".into())).unwrap();
        let point = rt.new_object(class);
        let three = rt.new_integer(3);

        assert_eq!(rt.invoke(point, "x", &[]), Ok(rt.nil()));
        rt.invoke(point, "x=", &[three]).unwrap();
        assert_eq!(rt.invoke(point, "x", &[]), Ok(three));
        assert_eq!(rt.ivar_get(point, "@x"), three);
    }

    #[test]
    fn hash_keys_compare_by_value() {
        let mut rt = runtime();
        let k1 = rt.new_string("a");
        let k2 = rt.new_string("a");
        let one = rt.new_integer(1);
        let two = rt.new_integer(2);
        let hash = rt.new_hash(vec![(k1, one)]);
        rt.hash_set(hash, k2, two);
        assert_eq!(rt.hash_pairs(hash).map(<[_]>::len), Some(1));
        assert_eq!(rt.hash_get(hash, k1), Some(two));
    }

    #[test]
    fn truthiness() {
        let rt = runtime();
        assert!(!rt.truthy(rt.nil()));
        assert!(!rt.truthy(rt.bool(false)));
        assert!(rt.truthy(rt.bool(true)));
        assert!(rt.truthy(rt.main()));
    }

    #[test]
    fn globals_default_to_nil() {
        let mut rt = runtime();
        assert_eq!(rt.global("$missing"), rt.nil());
        let one = rt.new_integer(1);
        rt.set_global("$x", one);
        assert_eq!(rt.global("$x"), one);
    }

    #[test]
    fn builtin_classes_are_constants() {
        let rt = runtime();
        assert_eq!(rt.constant("Object"), Some(rt.special().object));
        assert_eq!(rt.constant("Integer"), Some(rt.special().integer));
        assert_eq!(rt.constant("Nope"), None);
    }
}
