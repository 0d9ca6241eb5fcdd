//! Object model tests

use std::rc::Rc;

use crate::runtime::errors::RuntimeError;
use crate::runtime::object::generic;
use crate::runtime::object::{InstanceDict, Module, Namespace, SharedKeys, TypeBuilder};
use crate::runtime::value::{MethodRef, Name, Property, Value};

fn name(s: &str) -> Name {
    Name::new(s)
}

#[test]
fn test_c3_mro() {
    let o = TypeBuilder::new("O").build().unwrap();
    let a = TypeBuilder::new("A").base(&o).build().unwrap();
    let b = TypeBuilder::new("B").base(&o).build().unwrap();
    let c = TypeBuilder::new("C").base(&a).base(&b).build().unwrap();

    let names: Vec<String> = c.mro().iter().map(|t| t.name().to_string()).collect();
    assert_eq!(names, vec!["C", "A", "B", "O"]);
}

#[test]
fn test_inconsistent_mro_rejected() {
    let o = TypeBuilder::new("O").build().unwrap();
    let a = TypeBuilder::new("A").base(&o).build().unwrap();
    let result = TypeBuilder::new("Bad").base(&o).base(&a).build();
    assert!(matches!(result, Err(RuntimeError::TypeError(_))));
}

#[test]
fn test_lookup_follows_mro() {
    let base = TypeBuilder::new("Base")
        .attr("x", Value::Int(1))
        .build()
        .unwrap();
    let derived = TypeBuilder::new("Derived").base(&base).build().unwrap();
    assert_eq!(derived.lookup("x"), Some(Value::Int(1)));
    assert_eq!(derived.own_attr("x"), None);
    assert!(derived.is_subtype(&base));
    assert!(!base.is_subtype(&derived));
}

#[test]
fn test_subclasses_are_weak() {
    let base = TypeBuilder::new("Base").build().unwrap();
    {
        let _derived = TypeBuilder::new("Derived").base(&base).build().unwrap();
        assert_eq!(base.subclasses().len(), 1);
    }
    assert!(base.subclasses().is_empty());
}

#[test]
fn test_slot_layout_inherits_offsets() {
    let base = TypeBuilder::new("Base").slot("a").no_dict().build().unwrap();
    let derived = TypeBuilder::new("Derived")
        .base(&base)
        .slot("b")
        .no_dict()
        .build()
        .unwrap();
    assert_eq!(derived.nslots(), 2);
    assert!(!derived.has_dict());
    match derived.lookup("b") {
        Some(Value::Member(m)) => assert_eq!(m.offset, 1),
        other => panic!("expected member, got {:?}", other),
    }
}

#[test]
fn test_slot_get_set() {
    let ty = TypeBuilder::new("P").slot("x").no_dict().build().unwrap();
    let obj = Value::Instance(ty.instantiate());
    let x = name("x");

    let err = generic::getattr(&obj, &x).unwrap_err();
    assert!(err.is_attribute_error());

    generic::setattr(&obj, &x, Value::Int(5)).unwrap();
    assert_eq!(generic::getattr(&obj, &x).unwrap(), Value::Int(5));

    let err = generic::setattr(&obj, &name("y"), Value::Int(1)).unwrap_err();
    assert_eq!(err, RuntimeError::no_attribute("P", "y"));
}

#[test]
fn test_readonly_slot() {
    let ty = TypeBuilder::new("R").readonly_slot("k").build().unwrap();
    let obj = Value::Instance(ty.instantiate());
    assert!(generic::setattr(&obj, &name("k"), Value::Int(1)).is_err());
}

#[test]
fn test_data_descriptor_beats_dict() {
    let ty = TypeBuilder::new("T")
        .attr(
            "p",
            Value::Property(Property::readonly("p", |_| Ok(Value::Int(42)))),
        )
        .build()
        .unwrap();
    let inst = ty.instantiate();
    inst.set_dict_item(&name("p"), Value::Int(0)).unwrap();
    let obj = Value::Instance(inst);
    assert_eq!(generic::getattr(&obj, &name("p")).unwrap(), Value::Int(42));
}

#[test]
fn test_dict_shadows_method() {
    let ty = TypeBuilder::new("T")
        .method("m", |_| Ok(Value::Int(1)))
        .build()
        .unwrap();
    let inst = ty.instantiate();
    let obj = Value::Instance(inst.clone());

    let method = generic::get_method(&obj, &name("m")).unwrap();
    assert!(method.is_unbound());
    assert_eq!(generic::call_method(&method, &[]).unwrap(), Value::Int(1));

    inst.set_dict_item(&name("m"), Value::Int(7)).unwrap();
    assert_eq!(
        generic::get_method(&obj, &name("m")).unwrap(),
        MethodRef::Bound(Value::Int(7))
    );
}

#[test]
fn test_bound_method_receives_self() {
    let ty = TypeBuilder::new("T")
        .slot("v")
        .method("get", |args| generic::getattr(&args[0], &Name::new("v")))
        .build()
        .unwrap();
    let obj = Value::Instance(ty.instantiate());
    generic::setattr(&obj, &name("v"), Value::Int(3)).unwrap();
    let bound = generic::getattr(&obj, &name("get")).unwrap();
    assert_eq!(generic::call(&bound, &[]).unwrap(), Value::Int(3));
}

#[test]
fn test_getattr_hook_overrides_protocol() {
    let ty = TypeBuilder::new("Dyn")
        .getattr_hook(|_, n| Ok(Value::str(n.as_str())))
        .build()
        .unwrap();
    let sub = TypeBuilder::new("SubDyn").base(&ty).build().unwrap();
    assert!(!sub.has_default_getattr());
    let obj = Value::Instance(sub.instantiate());
    assert_eq!(generic::getattr(&obj, &name("hello")).unwrap(), Value::str("hello"));
}

#[test]
fn test_type_getattr_returns_unbound_function() {
    let ty = TypeBuilder::new("T")
        .method("m", |_| Ok(Value::None))
        .build()
        .unwrap();
    let v = generic::getattr(&Value::Type(ty), &name("m")).unwrap();
    assert!(matches!(v, Value::Function(_)));
}

#[test]
fn test_metatype_data_descriptor_wins() {
    let meta = TypeBuilder::new("Meta")
        .attr(
            "x",
            Value::Property(Property::readonly("x", |_| Ok(Value::str("meta")))),
        )
        .build()
        .unwrap();
    let ty = TypeBuilder::new("T")
        .metatype(&meta)
        .attr("x", Value::Int(1))
        .build()
        .unwrap();
    assert_eq!(
        generic::getattr(&Value::Type(ty), &name("x")).unwrap(),
        Value::str("meta")
    );
}

#[test]
fn test_split_dict_shares_keys() {
    let ty = TypeBuilder::new("S").build().unwrap();
    let a = ty.instantiate();
    let b = ty.instantiate();
    a.set_dict_item(&name("x"), Value::Int(1)).unwrap();
    b.set_dict_item(&name("x"), Value::Int(2)).unwrap();

    let keys_a = a.dict().as_ref().and_then(|d| d.split_keys().cloned()).unwrap();
    let keys_b = b.dict().as_ref().and_then(|d| d.split_keys().cloned()).unwrap();
    assert!(Rc::ptr_eq(&keys_a, &keys_b));
    assert_eq!(keys_a.fingerprint(), 1);
    assert_eq!(a.dict_get("x"), Some(Value::Int(1)));
    assert_eq!(b.dict_get("x"), Some(Value::Int(2)));
}

#[test]
fn test_split_dict_reshares_when_full() {
    let ty = TypeBuilder::new("S").keys_capacity(1).build().unwrap();
    let original = ty.cached_keys().unwrap();
    let inst = ty.instantiate();
    inst.set_dict_item(&name("a"), Value::Int(1)).unwrap();
    inst.set_dict_item(&name("b"), Value::Int(2)).unwrap();

    let reshared = ty.cached_keys().unwrap();
    assert!(!Rc::ptr_eq(&original, &reshared));
    assert!(reshared.capacity() >= 2);
    assert!(inst.dict().as_ref().unwrap().is_split());
    assert_eq!(inst.dict_get("a"), Some(Value::Int(1)));
    assert_eq!(inst.dict_get("b"), Some(Value::Int(2)));
}

#[test]
fn test_delete_drops_shared_keys() {
    let ty = TypeBuilder::new("S").build().unwrap();
    let inst = ty.instantiate();
    inst.set_dict_item(&name("a"), Value::Int(1)).unwrap();
    inst.del_dict_item(&name("a")).unwrap();
    assert!(ty.cached_keys().is_none());
    assert!(!inst.dict().as_ref().unwrap().is_split());
    assert!(inst.del_dict_item(&name("a")).is_err());
}

#[test]
fn test_instance_dict_keys_order() {
    let keys = SharedKeys::new(4);
    let mut dict = InstanceDict::for_type(Some(keys.clone()));
    dict.insert(&name("b"), Value::Int(2), Some(&keys));
    dict.insert(&name("a"), Value::Int(1), Some(&keys));
    assert_eq!(dict.keys(), vec![name("b"), name("a")]);
    assert_eq!(keys.index_of("a"), Some(1));
}

#[test]
fn test_split_insert_overwrites_by_name() {
    let keys = SharedKeys::new(2);
    let mut dict = InstanceDict::for_type(Some(keys.clone()));
    dict.insert(&name("x"), Value::Int(1), Some(&keys));
    dict.insert(&Name::new("x"), Value::Int(2), Some(&keys));
    assert_eq!(keys.len(), 1);
    assert!(dict.is_split());
    assert_eq!(dict.get("x"), Some(Value::Int(2)));
    assert_eq!(dict.get("y"), None);
}

#[test]
fn test_namespace_versions_increase() {
    let ns = Namespace::new();
    let v0 = ns.version();
    ns.set(&name("x"), Value::Int(1));
    let v1 = ns.version();
    assert!(v1 > v0);
    assert!(ns.remove("missing").is_none());
    assert_eq!(ns.version(), v1);
    ns.remove("x");
    assert!(ns.version() > v1);
}

#[test]
fn test_module_attributes() {
    let m = Module::new("m");
    m.set("answer", Value::Int(42));
    let obj = Value::Module(m.clone());
    assert_eq!(generic::getattr(&obj, &name("answer")).unwrap(), Value::Int(42));
    let err = generic::getattr(&obj, &name("nope")).unwrap_err();
    assert_eq!(err, RuntimeError::no_module_attribute("m", "nope"));
}

#[test]
fn test_getitem() {
    let list = Value::list(vec![Value::Int(10), Value::Int(20)]);
    assert_eq!(generic::getitem(&list, &Value::Int(-1)).unwrap(), Value::Int(20));
    assert!(matches!(
        generic::getitem(&list, &Value::Int(2)),
        Err(RuntimeError::IndexError(_))
    ));

    let dict = Value::dict(vec![(Value::str("k"), Value::Int(1))]).unwrap();
    assert_eq!(generic::getitem(&dict, &Value::str("k")).unwrap(), Value::Int(1));
    assert!(matches!(
        generic::getitem(&dict, &Value::str("z")),
        Err(RuntimeError::KeyError(_))
    ));

    assert!(matches!(
        generic::getitem(&Value::Int(1), &Value::Int(0)),
        Err(RuntimeError::TypeError(_))
    ));
}

#[test]
fn test_call_type_runs_init() {
    let ty = TypeBuilder::new("Point")
        .slot("x")
        .method("__init__", |args| {
            generic::setattr(&args[0], &Name::new("x"), args[1].clone())?;
            Ok(Value::None)
        })
        .build()
        .unwrap();
    let obj = generic::call(&Value::Type(ty), &[Value::Int(9)]).unwrap();
    assert_eq!(generic::getattr(&obj, &name("x")).unwrap(), Value::Int(9));
}
