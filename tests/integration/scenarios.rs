use shadowcode::runtime::errors::RuntimeError;
use shadowcode::runtime::object::{Module, TypeBuilder};
use shadowcode::runtime::value::Value;
use shadowcode::vm::{CodeBuilder, Opcode, VM};
use shadowcode::{clear_code_cache, ShadowConfig};

fn op_at(
    code: &shadowcode::CodeObject,
    at: usize,
) -> Option<Opcode> {
    code.current_instr(at).map(|(op, _)| op)
}

#[test]
fn test_unrelated_type_change_reresolves_to_same_value() {
    let module = Module::new("m");
    let point = TypeBuilder::new("Point").slot("x").no_dict().build().unwrap();
    let p = point.instantiate();
    p.slot_set(0, Some(Value::Int(42)));
    let p = Value::Instance(p);

    let code = CodeBuilder::new("get_x", &module)
        .locals(1)
        .load_fast(0)
        .load_attr("x")
        .return_value()
        .build();
    let mut vm = VM::new();
    assert_eq!(vm.run(&code, &[p.clone()]).unwrap(), Value::Int(42));
    assert_eq!(op_at(&code, 1), Some(Opcode::LoadAttrSlot));
    let before = code.l1_entry(0).unwrap();

    point.set_attr(&"label".into(), Value::str("point"));
    assert!(!before.is_valid());

    assert_eq!(vm.run(&code, &[p]).unwrap(), Value::Int(42));
    assert_eq!(op_at(&code, 1), Some(Opcode::LoadAttrSlot));
    let after = code.l1_entry(code.current_instr(1).unwrap().1).unwrap();
    assert!(after.is_valid());
    assert_eq!(code.update_count(), 1);
}

#[test]
fn test_store_then_load_through_split_dict() {
    let module = Module::new("m");
    let record = TypeBuilder::new("Record").build().unwrap();
    // def f(r, v): r.a = v; return r.a
    let code = CodeBuilder::new("roundtrip", &module)
        .locals(2)
        .load_fast(1)
        .load_fast(0)
        .store_attr("a")
        .load_fast(0)
        .load_attr("a")
        .return_value()
        .build();
    let mut vm = VM::new();
    for i in 0..5 {
        let r = Value::Instance(record.instantiate());
        assert_eq!(vm.run(&code, &[r, Value::Int(i)]).unwrap(), Value::Int(i));
    }
    assert_eq!(op_at(&code, 2), Some(Opcode::StoreAttrSplitDict));
    assert_eq!(op_at(&code, 4), Some(Opcode::LoadAttrSplitDict));
}

#[test]
fn test_module_function_call_follows_rebinding() {
    let module = Module::new("m");
    let lib = Module::new("lib");
    lib.set("answer", Value::Int(0));
    module.set("lib", Value::Module(lib.clone()));
    // def f(): return lib.answer
    let code = CodeBuilder::new("read", &module)
        .load_global("lib")
        .load_attr("answer")
        .return_value()
        .build();
    let mut vm = VM::new();
    assert_eq!(vm.run(&code, &[]).unwrap(), Value::Int(0));
    assert_eq!(op_at(&code, 1), Some(Opcode::LoadAttrModule));

    lib.set("answer", Value::Int(1));
    assert_eq!(vm.run(&code, &[]).unwrap(), Value::Int(1));

    lib.remove("answer");
    let err = vm.run(&code, &[]).unwrap_err();
    assert!(matches!(err.as_runtime(), Some(RuntimeError::AttributeError(_))));
}

#[test]
fn test_clearing_code_cache_mid_stream() {
    let module = Module::new("m");
    module.set("g", Value::Int(5));
    let code = CodeBuilder::new("glob", &module)
        .load_global("g")
        .return_value()
        .build();
    let mut vm = VM::new();
    vm.run(&code, &[]).unwrap();
    assert!(code.has_shadow());

    clear_code_cache(&code);
    assert!(!code.has_shadow());
    assert_eq!(op_at(&code, 0), Some(Opcode::LoadGlobal));
    assert_eq!(vm.run(&code, &[]).unwrap(), Value::Int(5));
    assert_eq!(op_at(&code, 0), Some(Opcode::LoadGlobalCached));
}

#[test]
fn test_warmup_delays_shadow_creation() {
    let module = Module::new("m");
    let code = CodeBuilder::new("const", &module)
        .load_const(Value::Int(1))
        .return_value()
        .build();
    let mut vm = VM::new_with_config(ShadowConfig {
        warmup_calls: 2,
        ..ShadowConfig::default()
    });
    vm.run(&code, &[]).unwrap();
    vm.run(&code, &[]).unwrap();
    assert!(!code.has_shadow());
    vm.run(&code, &[]).unwrap();
    assert!(code.has_shadow());
}
