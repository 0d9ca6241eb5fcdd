//! Tests for core value types

use std::rc::Rc;

use crate::runtime::errors::RuntimeError;
use crate::runtime::value::{DictKey, Function, MethodRef, Name, ObjectId, Value};

#[test]
fn test_name_interning_shares_storage() {
    let a = Name::new("velocity");
    let b = Name::new("velocity");
    assert_eq!(a, b);
    assert!(std::ptr::eq(a.as_str(), b.as_str()));
    assert_ne!(a, Name::new("position"));
}

#[test]
fn test_name_borrow_lookup() {
    let mut map = std::collections::HashMap::new();
    map.insert(Name::new("x"), 1);
    assert_eq!(map.get("x"), Some(&1));
    assert_eq!(map.get("y"), None);
}

#[test]
fn test_object_ids_are_unique() {
    let a = ObjectId::next();
    let b = ObjectId::next();
    assert_ne!(a, b);
    assert!(b > a);
}

#[test]
fn test_dict_key_roundtrip() {
    let key = Value::str("k").to_key().unwrap();
    assert_eq!(key, DictKey::Str(Rc::from("k")));
    assert_eq!(key.to_value(), Value::str("k"));
    assert_eq!(Value::Int(3).to_key().unwrap(), DictKey::Int(3));
}

#[test]
fn test_unhashable_key() {
    let err = Value::list(vec![]).to_key().unwrap_err();
    assert_eq!(
        err,
        RuntimeError::TypeError("unhashable type: 'list'".to_string())
    );
}

#[test]
fn test_value_equality() {
    assert_eq!(Value::Int(1), Value::Int(1));
    assert_ne!(Value::Int(1), Value::Float(1.0));
    assert_eq!(
        Value::tuple(vec![Value::Int(1), Value::str("a")]),
        Value::tuple(vec![Value::Int(1), Value::str("a")])
    );

    let f = Function::new("f", |_| Ok(Value::None));
    let g = Function::new("f", |_| Ok(Value::None));
    assert_eq!(Value::Function(f.clone()), Value::Function(f));
    assert_ne!(
        Value::Function(g),
        Value::Function(Function::new("f", |_| Ok(Value::None)))
    );
}

#[test]
fn test_descriptor_classification() {
    let f = Value::Function(Function::new("m", |_| Ok(Value::None)));
    assert!(f.is_method());
    assert!(!f.is_data_descriptor());
    assert!(!Value::Int(0).is_method());
}

#[test]
fn test_function_call() {
    let add = Function::new("add", |args| match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        _ => Err(RuntimeError::TypeError("bad operands".to_string())),
    });
    assert_eq!(add.call(&[Value::Int(2), Value::Int(3)]), Ok(Value::Int(5)));
}

#[test]
fn test_method_ref() {
    let unbound = MethodRef::Unbound {
        func: Value::None,
        receiver: Value::Int(1),
    };
    assert!(unbound.is_unbound());
    assert!(!MethodRef::Bound(Value::None).is_unbound());
}

#[test]
fn test_type_names() {
    assert_eq!(Value::None.type_name(), "NoneType");
    assert_eq!(Value::str("s").type_name(), "str");
    assert_eq!(Value::dict(vec![]).unwrap().type_name(), "dict");
}

#[test]
fn test_container_equality_compares_contents() {
    let a = Value::list(vec![Value::Int(1), Value::Int(2)]);
    let b = Value::list(vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(a, b);
    if let Value::List(items) = &b {
        items.borrow_mut().push(Value::Int(3));
    }
    assert_ne!(a, b);

    let d1 = Value::dict(vec![(Value::str("k"), Value::Int(1))]).unwrap();
    let d2 = Value::dict(vec![(Value::str("k"), Value::Int(1))]).unwrap();
    assert_eq!(d1, d2);
    assert_ne!(d1, Value::dict(vec![(Value::str("k"), Value::Int(2))]).unwrap());
    assert_ne!(a, d1);
}

#[test]
fn test_container_debug_lists_entries() {
    let list = Value::list(vec![Value::Int(1), Value::str("a")]);
    assert_eq!(format!("{:?}", list), "[1, \"a\"]");
    let dict = Value::dict(vec![(Value::str("k"), Value::Int(7))]).unwrap();
    assert_eq!(format!("{:?}", dict), "{\"k\": 7}");
}
