//! Generic attribute, method, subscript and call paths
//!
//! 这些函数总是正确的：缓存层放弃或未命中时都回落到这里。

use std::rc::Rc;

use crate::runtime::errors::{RuntimeError, RuntimeResult};
use crate::runtime::object::{Instance, TypeObject};
use crate::runtime::value::{BoundMethod, MethodRef, Name, Value};

/// 描述符读取
///
/// `obj` 为 `None` 表示在类型上访问（返回未绑定的描述符本身）。
pub fn descr_get(
    descr: &Value,
    obj: Option<&Value>,
) -> RuntimeResult<Value> {
    let Some(obj) = obj else {
        return Ok(descr.clone());
    };
    match descr {
        Value::Function(func) => Ok(Value::BoundMethod(Rc::new(BoundMethod {
            receiver: obj.clone(),
            func: func.clone(),
        }))),
        Value::Member(member) => match obj {
            Value::Instance(inst) => inst.slot_get(member.offset).ok_or_else(|| {
                RuntimeError::no_attribute(
                    inst.type_object().name().as_str(),
                    member.name.as_str(),
                )
            }),
            other => Err(RuntimeError::TypeError(format!(
                "descriptor '{}' doesn't apply to a '{}' object",
                member.name,
                other.type_name()
            ))),
        },
        Value::Property(prop) => match &prop.getter {
            Some(getter) => getter(obj),
            None => Err(RuntimeError::AttributeError(format!(
                "property '{}' has no getter",
                prop.name
            ))),
        },
        other => Ok(other.clone()),
    }
}

/// 数据描述符写入
pub fn descr_set(
    descr: &Value,
    obj: &Value,
    value: Value,
) -> RuntimeResult<()> {
    match descr {
        Value::Member(member) => {
            if member.readonly {
                return Err(RuntimeError::AttributeError(format!(
                    "readonly attribute '{}'",
                    member.name
                )));
            }
            match obj {
                Value::Instance(inst) => {
                    inst.slot_set(member.offset, Some(value));
                    Ok(())
                }
                other => Err(RuntimeError::TypeError(format!(
                    "descriptor '{}' doesn't apply to a '{}' object",
                    member.name,
                    other.type_name()
                ))),
            }
        }
        Value::Property(prop) => match &prop.setter {
            Some(setter) => setter(obj, value),
            None => Err(RuntimeError::AttributeError(format!(
                "can't set attribute '{}'",
                prop.name
            ))),
        },
        other => Err(RuntimeError::TypeError(format!(
            "'{}' is not a data descriptor",
            other.type_name()
        ))),
    }
}

/// 实例属性的默认读取协议：数据描述符 > 实例字典 > 非数据描述符
pub fn instance_getattr_default(
    obj: &Value,
    inst: &Instance,
    name: &Name,
) -> RuntimeResult<Value> {
    let ty = inst.type_object();
    let descr = ty.lookup(name.as_str());
    if let Some(descr) = descr.as_ref().filter(|d| d.is_data_descriptor()) {
        return descr_get(descr, Some(obj));
    }
    if let Some(value) = inst.dict_get(name.as_str()) {
        return Ok(value);
    }
    match descr {
        Some(descr) => descr_get(&descr, Some(obj)),
        None => Err(RuntimeError::no_attribute(
            ty.name().as_str(),
            name.as_str(),
        )),
    }
}

/// 类型属性读取：元类型数据描述符 > 类型 MRO > 元类型属性
pub fn type_getattr(
    ty: &Rc<TypeObject>,
    name: &Name,
) -> RuntimeResult<Value> {
    let receiver = Value::Type(ty.clone());
    if let Some(meta) = ty.metatype() {
        if let Some(hook) = meta.getattr_hook() {
            return hook(&receiver, name);
        }
    }
    let meta_attr = ty.metatype().and_then(|m| m.lookup(name.as_str()));
    if let Some(descr) = meta_attr.as_ref().filter(|d| d.is_data_descriptor()) {
        return descr_get(descr, Some(&receiver));
    }
    if let Some(value) = ty.lookup(name.as_str()) {
        return descr_get(&value, None);
    }
    match meta_attr {
        Some(attr) => descr_get(&attr, Some(&receiver)),
        None => Err(RuntimeError::no_type_attribute(
            ty.name().as_str(),
            name.as_str(),
        )),
    }
}

/// 通用属性读取
pub fn getattr(
    obj: &Value,
    name: &Name,
) -> RuntimeResult<Value> {
    match obj {
        Value::Instance(inst) => match inst.type_object().getattr_hook() {
            Some(hook) => hook(obj, name),
            None => instance_getattr_default(obj, inst, name),
        },
        Value::Type(ty) => type_getattr(ty, name),
        Value::Module(module) => module
            .get(name.as_str())
            .ok_or_else(|| RuntimeError::no_module_attribute(module.name().as_str(), name.as_str())),
        other => Err(RuntimeError::no_attribute(&other.type_name(), name.as_str())),
    }
}

/// 通用属性写入
pub fn setattr(
    obj: &Value,
    name: &Name,
    value: Value,
) -> RuntimeResult<()> {
    match obj {
        Value::Instance(inst) => {
            let ty = inst.type_object();
            if let Some(hook) = ty.setattr_hook() {
                return hook(obj, name, value);
            }
            if let Some(descr) = ty.lookup(name.as_str()).filter(|d| d.is_data_descriptor()) {
                return descr_set(&descr, obj, value);
            }
            inst.set_dict_item(name, value)
        }
        Value::Type(ty) => {
            ty.set_attr(name, value);
            Ok(())
        }
        Value::Module(module) => {
            module.namespace().set(name, value);
            Ok(())
        }
        other => Err(RuntimeError::no_attribute(&other.type_name(), name.as_str())),
    }
}

/// 通用属性删除
pub fn delattr(
    obj: &Value,
    name: &Name,
) -> RuntimeResult<()> {
    match obj {
        Value::Instance(inst) => {
            let ty = inst.type_object();
            if let Some(Value::Member(member)) = ty.lookup(name.as_str()) {
                if inst.slot_get(member.offset).is_none() {
                    return Err(RuntimeError::no_attribute(ty.name().as_str(), name.as_str()));
                }
                inst.slot_set(member.offset, None);
                return Ok(());
            }
            inst.del_dict_item(name)
        }
        Value::Type(ty) => ty.del_attr(name),
        Value::Module(module) => module
            .remove(name.as_str())
            .map(|_| ())
            .ok_or_else(|| RuntimeError::no_module_attribute(module.name().as_str(), name.as_str())),
        other => Err(RuntimeError::no_attribute(&other.type_name(), name.as_str())),
    }
}

/// 通用方法读取
///
/// 默认协议下，若找到的是方法且未被实例字典遮蔽，返回未绑定形式。
pub fn get_method(
    obj: &Value,
    name: &Name,
) -> RuntimeResult<MethodRef> {
    if let Value::Instance(inst) = obj {
        let ty = inst.type_object();
        if ty.has_default_getattr() {
            if let Some(descr) = ty.lookup(name.as_str()).filter(|d| d.is_method()) {
                if inst.dict_get(name.as_str()).is_none() {
                    return Ok(MethodRef::Unbound {
                        func: descr,
                        receiver: obj.clone(),
                    });
                }
            }
        }
    }
    getattr(obj, name).map(MethodRef::Bound)
}

/// 通用下标读取
pub fn getitem(
    container: &Value,
    key: &Value,
) -> RuntimeResult<Value> {
    match container {
        Value::Dict(map) => {
            let dict_key = key.to_key()?;
            map.borrow()
                .get(&dict_key)
                .cloned()
                .ok_or_else(|| RuntimeError::KeyError(format!("{:?}", key)))
        }
        Value::List(items) => {
            let items = items.borrow();
            let index = sequence_index(key, items.len(), "list")?;
            Ok(items[index].clone())
        }
        Value::Tuple(items) => {
            let index = sequence_index(key, items.len(), "tuple")?;
            Ok(items[index].clone())
        }
        other => Err(RuntimeError::TypeError(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// 规范化序列下标（支持负数）
pub fn sequence_index(
    key: &Value,
    len: usize,
    kind: &str,
) -> RuntimeResult<usize> {
    let Value::Int(raw) = key else {
        return Err(RuntimeError::TypeError(format!(
            "{} indices must be integers, not {}",
            kind,
            key.type_name()
        )));
    };
    let adjusted = if *raw < 0 { *raw + len as i64 } else { *raw };
    if adjusted < 0 || adjusted >= len as i64 {
        return Err(RuntimeError::IndexError(format!("{} index out of range", kind)));
    }
    Ok(adjusted as usize)
}

/// 通用调用
pub fn call(
    callable: &Value,
    args: &[Value],
) -> RuntimeResult<Value> {
    match callable {
        Value::Function(func) => func.call(args),
        Value::BoundMethod(method) => {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(method.receiver.clone());
            full.extend_from_slice(args);
            method.func.call(&full)
        }
        Value::Type(ty) => {
            let instance = Value::Instance(ty.instantiate());
            if let Some(Value::Function(init)) = ty.lookup("__init__") {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(instance.clone());
                full.extend_from_slice(args);
                init.call(&full)?;
            }
            Ok(instance)
        }
        other => Err(RuntimeError::TypeError(format!(
            "'{}' object is not callable",
            other.type_name()
        ))),
    }
}

/// 调用 `LOAD_METHOD` 的结果
pub fn call_method(
    method: &MethodRef,
    args: &[Value],
) -> RuntimeResult<Value> {
    match method {
        MethodRef::Unbound { func, receiver } => {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(receiver.clone());
            full.extend_from_slice(args);
            call(func, &full)
        }
        MethodRef::Bound(callable) => call(callable, args),
    }
}
