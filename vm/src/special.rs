use crate::object::{ClassData, MObj, ObjId, Payload};

/// Handles of the builtin classes and singleton values of one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialObjects {
    pub object: ObjId,
    pub class: ObjId,
    pub module: ObjId,
    pub integer: ObjId,
    pub string: ObjId,
    pub symbol: ObjId,
    pub array: ObjId,
    pub hash: ObjId,
    pub range: ObjId,
    pub proc: ObjId,
    pub nil_class: ObjId,
    pub true_class: ObjId,
    pub false_class: ObjId,

    pub nil: ObjId,
    pub true_obj: ObjId,
    pub false_obj: ObjId,
    pub main: ObjId,
}

impl SpecialObjects {
    /// The builtin classes with the constant names they are bound to.
    pub fn classes(&self) -> [(&'static str, ObjId); 13] {
        [
            ("Object", self.object),
            ("Class", self.class),
            ("Module", self.module),
            ("Integer", self.integer),
            ("String", self.string),
            ("Symbol", self.symbol),
            ("Array", self.array),
            ("Hash", self.hash),
            ("Range", self.range),
            ("Proc", self.proc),
            ("NilClass", self.nil_class),
            ("TrueClass", self.true_class),
            ("FalseClass", self.false_class),
        ]
    }
}

/// Stands in for `Class` until `Class` itself exists.
const CLASS_PLACEHOLDER: ObjId = ObjId(0);

fn alloc<'a>(objects: &mut Vec<MObj<'a>>, obj: MObj<'a>) -> ObjId {
    let id = ObjId(objects.len() as u32);
    objects.push(obj);
    id
}

/// Populate an empty arena with the builtin object graph.
///
/// `Object` and `Class` refer to each other: both are instances of `Class`
/// and `Class` inherits from `Object`. The cycle is closed by patching their
/// class handles once `Class` has been allocated.
pub fn bootstrap<'a>(objects: &mut Vec<MObj<'a>>) -> SpecialObjects {
    debug_assert!(objects.is_empty());

    let class_obj = |objects: &mut Vec<MObj<'a>>,
                     class: ObjId,
                     name: &str,
                     superclass: Option<ObjId>| {
        alloc(
            objects,
            MObj::new(class, Payload::Class(ClassData::new(name, superclass))),
        )
    };

    // 1. Object and Class, class handles patched below
    let object = class_obj(objects, CLASS_PLACEHOLDER, "Object", None);
    let class = class_obj(objects, CLASS_PLACEHOLDER, "Class", Some(object));
    objects[object.index()].class = class;
    objects[class.index()].class = class;

    // 2. remaining builtin classes
    let builtin = |objects: &mut Vec<MObj<'a>>, name: &str| {
        class_obj(objects, class, name, Some(object))
    };
    let module = builtin(objects, "Module");
    let integer = builtin(objects, "Integer");
    let string = builtin(objects, "String");
    let symbol = builtin(objects, "Symbol");
    let array = builtin(objects, "Array");
    let hash = builtin(objects, "Hash");
    let range = builtin(objects, "Range");
    let proc = builtin(objects, "Proc");
    let nil_class = builtin(objects, "NilClass");
    let true_class = builtin(objects, "TrueClass");
    let false_class = builtin(objects, "FalseClass");

    // 3. nil, true, false
    let nil = alloc(objects, MObj::new(nil_class, Payload::Plain));
    let true_obj = alloc(objects, MObj::new(true_class, Payload::Plain));
    let false_obj = alloc(objects, MObj::new(false_class, Payload::Plain));

    // 4. top-level self
    let main = alloc(objects, MObj::new(object, Payload::Plain));

    SpecialObjects {
        object,
        class,
        module,
        integer,
        string,
        symbol,
        array,
        hash,
        range,
        proc,
        nil_class,
        true_class,
        false_class,
        nil,
        true_obj,
        false_obj,
        main,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_and_class_close_the_cycle() {
        let mut objects = Vec::new();
        let special = bootstrap(&mut objects);

        let object = &objects[special.object.index()];
        let class = &objects[special.class.index()];
        assert_eq!(object.class, special.class);
        assert_eq!(class.class, special.class);
        assert_eq!(object.class_data().unwrap().superclass, None);
        assert_eq!(
            class.class_data().unwrap().superclass,
            Some(special.object)
        );
    }

    #[test]
    fn builtin_classes_inherit_from_object() {
        let mut objects = Vec::new();
        let special = bootstrap(&mut objects);
        for (name, id) in special.classes().into_iter().skip(2) {
            let data = objects[id.index()].class_data().unwrap();
            assert_eq!(data.name, name);
            assert_eq!(data.superclass, Some(special.object), "{name}");
            assert_eq!(objects[id.index()].class, special.class, "{name}");
        }
        assert_eq!(objects[special.nil.index()].class, special.nil_class);
        assert_eq!(objects[special.main.index()].class, special.object);
    }
}
