//! Shadow bytecode tests module

use std::rc::Rc;

use crate::runtime::object::{Module, TypeBuilder, TypeObject};
use crate::runtime::value::{Name, ObjectId, Value};
use crate::util::config::ShadowConfig;
use crate::vm::code::{CodeBuilder, CodeObject};
use crate::vm::opcode::Opcode;
use crate::vm::VM;

mod l1;
mod soundness;

fn name(s: &str) -> Name {
    Name::new(s)
}

/// 带一个可写槽位 `x` 的无字典类型
fn slot_type(type_name: &str) -> Rc<TypeObject> {
    TypeBuilder::new(type_name)
        .slot("x")
        .no_dict()
        .build()
        .unwrap()
}

/// 槽位 `x` 已赋值的实例
fn slot_instance(
    ty: &Rc<TypeObject>,
    x: i64,
) -> Value {
    let inst = ty.instantiate();
    inst.slot_set(0, Some(Value::Int(x)));
    Value::Instance(inst)
}

/// `def f(o): return o.<attr>`，读取指令位于 1
fn load_attr_code(
    module: &Rc<Module>,
    attr: &str,
) -> CodeObject {
    CodeBuilder::new("get", module)
        .locals(1)
        .load_fast(0)
        .load_attr(attr)
        .return_value()
        .build()
}

/// `def f(o, v): o.<attr> = v`，写入指令位于 2
fn store_attr_code(
    module: &Rc<Module>,
    attr: &str,
) -> CodeObject {
    CodeBuilder::new("set", module)
        .locals(2)
        .load_fast(1)
        .load_fast(0)
        .store_attr(attr)
        .load_const(Value::None)
        .return_value()
        .build()
}

fn vm_with(config: ShadowConfig) -> VM {
    VM::new_with_config(config)
}

/// 调用点当前的操作码
fn op_at(
    code: &CodeObject,
    at: usize,
) -> Option<Opcode> {
    code.current_instr(at).map(|(op, _)| op)
}

fn fresh_owner() -> ObjectId {
    ObjectId::next()
}
