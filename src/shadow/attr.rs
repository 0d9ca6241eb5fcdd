//! Attribute handlers
//!
//! 分派循环对 `LoadAttr*`、`LoadMethod*`、`StoreAttr*` 的入口。
//! 未特化指令解析策略并改写调用点；特化指令校验条目后走快速路径，
//! 失败时回到解析（必要时升级为多态或去优化）。
//!
//! 条目策略到操作码与快速路径的映射是一张静态表（[`kind_ops`]）。

use std::rc::Rc;

use crate::runtime::errors::{RuntimeError, RuntimeResult};
use crate::runtime::object::generic;
use crate::runtime::object::Instance;
use crate::runtime::value::{MethodRef, Name, Value};
use crate::shadow::entry::{CacheEntry, EntryKind};
use crate::shadow::stats::{self, UncacheableReason};
use crate::shadow::{invalidate, polymorphic, resolve, ShadowContext};
use crate::vm::code::CodeObject;
use crate::vm::opcode::Opcode;

type LoadAttrFn = fn(Opcode, &CacheEntry, &Value, &Instance) -> RuntimeResult<Value>;
type LoadMethodFn = fn(Opcode, &CacheEntry, &Value, &Instance) -> RuntimeResult<MethodRef>;
type StoreAttrFn = fn(Opcode, &CacheEntry, &Value, &Instance, Value) -> RuntimeResult<()>;

/// 条目策略对应的特化操作码与快速路径
pub struct KindOps {
    pub load_attr_op: Opcode,
    pub load_method_op: Opcode,
    pub store_attr_op: Option<Opcode>,
    pub load_attr: LoadAttrFn,
    pub load_method: LoadMethodFn,
    pub store_attr: StoreAttrFn,
}

static KIND_OPS: [KindOps; EntryKind::COUNT] = [
    // Slot
    KindOps {
        load_attr_op: Opcode::LoadAttrSlot,
        load_method_op: Opcode::LoadMethodNoDictDescr,
        store_attr_op: Some(Opcode::StoreAttrSlot),
        load_attr: slot_load_attr,
        load_method: slot_load_method,
        store_attr: slot_store_attr,
    },
    // NoDictDescr
    KindOps {
        load_attr_op: Opcode::LoadAttrNoDictDescr,
        load_method_op: Opcode::LoadMethodNoDictDescr,
        store_attr_op: Some(Opcode::StoreAttrDescr),
        load_attr: descr_load_attr,
        load_method: descr_load_method,
        store_attr: descr_store_attr,
    },
    // NoDictMethod
    KindOps {
        load_attr_op: Opcode::LoadAttrNoDictDescr,
        load_method_op: Opcode::LoadMethodNoDictMethod,
        store_attr_op: Some(Opcode::StoreAttrDescr),
        load_attr: descr_load_attr,
        load_method: method_load_method,
        store_attr: descr_store_attr,
    },
    // DictNoDescr
    KindOps {
        load_attr_op: Opcode::LoadAttrDictNoDescr,
        load_method_op: Opcode::LoadMethodDictDescr,
        store_attr_op: Some(Opcode::StoreAttrDict),
        load_attr: dict_load_attr,
        load_method: dict_load_method,
        store_attr: dict_store_attr,
    },
    // DictDescr
    KindOps {
        load_attr_op: Opcode::LoadAttrDictDescr,
        load_method_op: Opcode::LoadMethodDictDescr,
        store_attr_op: Some(Opcode::StoreAttrDict),
        load_attr: dict_load_attr,
        load_method: dict_load_method,
        store_attr: dict_store_attr,
    },
    // DictMethod
    KindOps {
        load_attr_op: Opcode::LoadAttrDictDescr,
        load_method_op: Opcode::LoadMethodDictMethod,
        store_attr_op: Some(Opcode::StoreAttrDict),
        load_attr: dict_load_attr,
        load_method: dict_method_load_method,
        store_attr: dict_store_attr,
    },
    // SplitDict
    KindOps {
        load_attr_op: Opcode::LoadAttrSplitDict,
        load_method_op: Opcode::LoadMethodSplitDictDescr,
        store_attr_op: Some(Opcode::StoreAttrSplitDict),
        load_attr: split_load_attr,
        load_method: split_load_method,
        store_attr: split_store_attr,
    },
    // SplitDictDescr
    KindOps {
        load_attr_op: Opcode::LoadAttrSplitDictDescr,
        load_method_op: Opcode::LoadMethodSplitDictDescr,
        store_attr_op: Some(Opcode::StoreAttrSplitDict),
        load_attr: split_load_attr,
        load_method: split_load_method,
        store_attr: split_store_attr,
    },
    // SplitDictMethod
    KindOps {
        load_attr_op: Opcode::LoadAttrSplitDictDescr,
        load_method_op: Opcode::LoadMethodSplitDictMethod,
        store_attr_op: Some(Opcode::StoreAttrSplitDict),
        load_attr: split_load_attr,
        load_method: split_method_load_method,
        store_attr: split_store_attr,
    },
    // Module（只经由模块处理函数使用）
    KindOps {
        load_attr_op: Opcode::LoadAttrModule,
        load_method_op: Opcode::LoadMethodModule,
        store_attr_op: None,
        load_attr: fallback_load_attr,
        load_method: fallback_load_method,
        store_attr: fallback_store_attr,
    },
];

/// 条目策略的分派表项
pub fn kind_ops(kind: EntryKind) -> &'static KindOps {
    &KIND_OPS[kind.index()]
}

// =====================
// 快速路径
// =====================

fn fallback_load_attr(
    _op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    _inst: &Instance,
) -> RuntimeResult<Value> {
    generic::getattr(obj, entry.name())
}

fn fallback_load_method(
    _op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    _inst: &Instance,
) -> RuntimeResult<MethodRef> {
    generic::get_method(obj, entry.name())
}

fn fallback_store_attr(
    _op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    _inst: &Instance,
    value: Value,
) -> RuntimeResult<()> {
    generic::setattr(obj, entry.name(), value)
}

fn slot_load_attr(
    _op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    inst: &Instance,
) -> RuntimeResult<Value> {
    match inst.slot_get(entry.offset()) {
        Some(value) => Ok(value),
        None => generic::getattr(obj, entry.name()),
    }
}

fn slot_load_method(
    op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    inst: &Instance,
) -> RuntimeResult<MethodRef> {
    slot_load_attr(op, entry, obj, inst).map(MethodRef::Bound)
}

fn slot_store_attr(
    _op: Opcode,
    entry: &CacheEntry,
    _obj: &Value,
    inst: &Instance,
    value: Value,
) -> RuntimeResult<()> {
    inst.slot_set(entry.offset(), Some(value));
    Ok(())
}

fn descr_load_attr(
    _op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    _inst: &Instance,
) -> RuntimeResult<Value> {
    match entry.value() {
        Some(descr) => generic::descr_get(&descr, Some(obj)),
        None => generic::getattr(obj, entry.name()),
    }
}

fn descr_load_method(
    op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    inst: &Instance,
) -> RuntimeResult<MethodRef> {
    descr_load_attr(op, entry, obj, inst).map(MethodRef::Bound)
}

fn descr_store_attr(
    _op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    _inst: &Instance,
    value: Value,
) -> RuntimeResult<()> {
    match entry.value().filter(Value::is_data_descriptor) {
        Some(descr) => generic::descr_set(&descr, obj, value),
        None => generic::setattr(obj, entry.name(), value),
    }
}

fn method_load_method(
    _op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    _inst: &Instance,
) -> RuntimeResult<MethodRef> {
    match entry.value() {
        Some(func) => Ok(MethodRef::Unbound {
            func,
            receiver: obj.clone(),
        }),
        None => generic::get_method(obj, entry.name()),
    }
}

fn dict_load_attr(
    _op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    inst: &Instance,
) -> RuntimeResult<Value> {
    if let Some(value) = inst.dict_get(entry.name().as_str()) {
        return Ok(value);
    }
    match entry.value() {
        Some(descr) => generic::descr_get(&descr, Some(obj)),
        None => generic::getattr(obj, entry.name()),
    }
}

fn dict_load_method(
    op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    inst: &Instance,
) -> RuntimeResult<MethodRef> {
    dict_load_attr(op, entry, obj, inst).map(MethodRef::Bound)
}

fn dict_method_load_method(
    _op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    inst: &Instance,
) -> RuntimeResult<MethodRef> {
    if let Some(value) = inst.dict_get(entry.name().as_str()) {
        return Ok(MethodRef::Bound(value));
    }
    match entry.value() {
        Some(func) => Ok(MethodRef::Unbound {
            func,
            receiver: obj.clone(),
        }),
        None => generic::get_method(obj, entry.name()),
    }
}

fn dict_store_attr(
    _op: Opcode,
    entry: &CacheEntry,
    _obj: &Value,
    inst: &Instance,
    value: Value,
) -> RuntimeResult<()> {
    inst.set_dict_item(entry.name(), value)
}

/// 共享键字典探测
///
/// 键表身份相同时按快照的位置读取；名称在快照中不存在且指纹未变时直接判定缺失。
/// 其余情况刷新条目的布局快照（轻微未命中）并按名称查找。
fn split_lookup(
    op: Opcode,
    entry: &CacheEntry,
    inst: &Instance,
) -> Option<Value> {
    let dict = inst.dict();
    let dict = dict.as_ref()?;
    let Some(keys) = dict.split_keys() else {
        return dict.get(entry.name().as_str());
    };
    let fast = entry
        .with_split(|layout| {
            if !Rc::ptr_eq(&layout.keys, keys) {
                return None;
            }
            match layout.index {
                Some(index) => Some(dict.split_value(index)),
                None if layout.fingerprint == keys.fingerprint() => Some(None),
                None => None,
            }
        })
        .flatten();
    if let Some(found) = fast {
        return found;
    }
    entry.refresh_split(keys);
    stats::record_slight_miss(op);
    dict.get(entry.name().as_str())
}

fn split_load_attr(
    op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    inst: &Instance,
) -> RuntimeResult<Value> {
    if let Some(value) = split_lookup(op, entry, inst) {
        return Ok(value);
    }
    match entry.value() {
        Some(descr) => generic::descr_get(&descr, Some(obj)),
        None => generic::getattr(obj, entry.name()),
    }
}

fn split_load_method(
    op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    inst: &Instance,
) -> RuntimeResult<MethodRef> {
    split_load_attr(op, entry, obj, inst).map(MethodRef::Bound)
}

fn split_method_load_method(
    op: Opcode,
    entry: &CacheEntry,
    obj: &Value,
    inst: &Instance,
) -> RuntimeResult<MethodRef> {
    if let Some(value) = split_lookup(op, entry, inst) {
        return Ok(MethodRef::Bound(value));
    }
    match entry.value() {
        Some(func) => Ok(MethodRef::Unbound {
            func,
            receiver: obj.clone(),
        }),
        None => generic::get_method(obj, entry.name()),
    }
}

/// 共享键字典写入
///
/// 名称已在快照的键表中时按位置写入；否则走通用插入，
/// 并用写入后的布局刷新条目。
fn split_store_attr(
    op: Opcode,
    entry: &CacheEntry,
    _obj: &Value,
    inst: &Instance,
    value: Value,
) -> RuntimeResult<()> {
    let fast = entry
        .with_split(|layout| layout.index.map(|index| (layout.keys.clone(), index)))
        .flatten();
    if let Some((keys, index)) = fast {
        if inst.set_split_value(&keys, index, value.clone()) {
            return Ok(());
        }
    }
    inst.set_dict_item(entry.name(), value)?;
    let keys = inst.dict().as_ref().and_then(|d| d.split_keys().cloned());
    if let Some(keys) = keys {
        entry.refresh_split(&keys);
    }
    stats::record_slight_miss(op);
    Ok(())
}

// =====================
// 调用点入口
// =====================

/// 结束于 `at` 的指令在规范指令流中引用的名称
pub fn site_name(
    code: &CodeObject,
    at: usize,
) -> RuntimeResult<Name> {
    code.original_name(at).ok_or_else(|| {
        RuntimeError::TypeError(format!(
            "'{}' at {}: name operand {} out of range",
            code.name(),
            at,
            code.original_arg(at)
        ))
    })
}

fn is_instance_load(op: Opcode) -> bool {
    matches!(
        op,
        Opcode::LoadAttrSlot
            | Opcode::LoadAttrNoDictDescr
            | Opcode::LoadAttrDictNoDescr
            | Opcode::LoadAttrDictDescr
            | Opcode::LoadAttrSplitDict
            | Opcode::LoadAttrSplitDictDescr
    )
}

/// 未特化的 `LoadAttr`：解析、改写调用点并读取
pub fn load_attr(
    _ctx: &ShadowContext<'_>,
    code: &CodeObject,
    at: usize,
    name: &Name,
    obj: &Value,
) -> RuntimeResult<Value> {
    match obj {
        Value::Instance(inst) => {
            let ty = inst.type_object();
            match resolve::get_cache_entry(ty, name) {
                Ok(entry) => {
                    let ops = kind_ops(entry.kind());
                    resolve::patch_or_miss(code, at, ops.load_attr_op, &entry);
                    (ops.load_attr)(ops.load_attr_op, &entry, obj, inst)
                }
                Err(reason) => {
                    resolve::attr_miss(Opcode::LoadAttr, reason, Some(ty));
                    generic::getattr(obj, name)
                }
            }
        }
        Value::Type(ty) => match resolve::get_type_attr_entry(ty, name) {
            Ok(entry) => {
                resolve::patch_or_miss(code, at, Opcode::LoadAttrType, &entry);
                match entry.value() {
                    Some(value) => generic::descr_get(&value, None),
                    None => generic::getattr(obj, name),
                }
            }
            Err(reason) => {
                resolve::attr_miss(Opcode::LoadAttr, reason, Some(ty));
                generic::getattr(obj, name)
            }
        },
        Value::Module(module) => match resolve::get_module_entry(module, name) {
            Ok(entry) => {
                resolve::patch_or_miss(code, at, Opcode::LoadAttrModule, &entry);
                match entry.value() {
                    Some(value) => Ok(value),
                    None => generic::getattr(obj, name),
                }
            }
            Err(reason) => {
                resolve::attr_miss(Opcode::LoadAttr, reason, None);
                generic::getattr(obj, name)
            }
        },
        _ => {
            resolve::attr_miss(Opcode::LoadAttr, UncacheableReason::UnsupportedReceiver, None);
            generic::getattr(obj, name)
        }
    }
}

/// 特化的 `LoadAttr*`（多态与不可缓存版本除外）
pub fn load_attr_cached(
    ctx: &ShadowContext<'_>,
    code: &CodeObject,
    at: usize,
    op: Opcode,
    index: u32,
    obj: &Value,
) -> RuntimeResult<Value> {
    let Some(entry) = code.l1_entry(index) else {
        // 影子字节码已被丢弃
        return generic::getattr(obj, &site_name(code, at)?);
    };

    match (op, obj) {
        (Opcode::LoadAttrModule, Value::Module(module)) if entry.is_valid_for(module.id()) => {
            if entry.version() == module.version() {
                if let Some(value) = entry.value() {
                    stats::record_hit(op);
                    return Ok(value);
                }
            } else if let Some(value) = module.get(entry.name().as_str()) {
                stats::record_slight_miss(op);
                entry.refresh_module(value.clone(), module.version());
                return Ok(value);
            }
        }
        (Opcode::LoadAttrType, Value::Type(ty)) if entry.is_valid_for(ty.id()) => {
            if let Some(value) = entry.value() {
                stats::record_hit(op);
                return generic::descr_get(&value, None);
            }
        }
        (_, Value::Instance(inst)) if is_instance_load(op) && entry.is_valid_for(inst.type_object().id()) => {
            let ops = kind_ops(entry.kind());
            debug_assert_eq!(ops.load_attr_op, op, "L1 entry {:?} under {}", entry.kind(), op);
            if ops.load_attr_op == op {
                stats::record_hit(op);
                return (ops.load_attr)(op, &entry, obj, inst);
            }
        }
        _ => {}
    }

    stats::record_miss(op);
    let name = entry.name().clone();
    if !entry.is_valid() {
        if invalidate::cache_hit_invalidate(ctx, code, at, op) {
            return generic::getattr(obj, &name);
        }
    } else if is_instance_load(op) && ctx.config.polymorphic {
        if let Value::Instance(inst) = obj {
            if let Some(result) = polymorphic::promote(ctx, code, at, &entry, obj, inst) {
                return result;
            }
        }
    }
    load_attr(ctx, code, at, &name, obj)
}

/// 未特化的 `LoadMethod`
pub fn load_method(
    _ctx: &ShadowContext<'_>,
    code: &CodeObject,
    at: usize,
    name: &Name,
    obj: &Value,
) -> RuntimeResult<MethodRef> {
    match obj {
        Value::Instance(inst) => {
            let ty = inst.type_object();
            match resolve::get_cache_entry(ty, name) {
                Ok(entry) => {
                    let ops = kind_ops(entry.kind());
                    resolve::patch_or_miss(code, at, ops.load_method_op, &entry);
                    (ops.load_method)(ops.load_method_op, &entry, obj, inst)
                }
                Err(reason) => {
                    resolve::attr_miss(Opcode::LoadMethod, reason, Some(ty));
                    generic::get_method(obj, name)
                }
            }
        }
        Value::Type(ty) => match resolve::get_type_attr_entry(ty, name) {
            Ok(entry) => {
                resolve::patch_or_miss(code, at, Opcode::LoadMethodType, &entry);
                match entry.value() {
                    Some(value) => generic::descr_get(&value, None).map(MethodRef::Bound),
                    None => generic::get_method(obj, name),
                }
            }
            Err(reason) => {
                resolve::attr_miss(Opcode::LoadMethod, reason, Some(ty));
                generic::get_method(obj, name)
            }
        },
        Value::Module(module) => match resolve::get_module_entry(module, name) {
            Ok(entry) => {
                resolve::patch_or_miss(code, at, Opcode::LoadMethodModule, &entry);
                match entry.value() {
                    Some(value) => Ok(MethodRef::Bound(value)),
                    None => generic::get_method(obj, name),
                }
            }
            Err(reason) => {
                resolve::attr_miss(Opcode::LoadMethod, reason, None);
                generic::get_method(obj, name)
            }
        },
        _ => {
            resolve::attr_miss(Opcode::LoadMethod, UncacheableReason::UnsupportedReceiver, None);
            generic::get_method(obj, name)
        }
    }
}

/// 特化的 `LoadMethod*`（不可缓存版本除外）
pub fn load_method_cached(
    ctx: &ShadowContext<'_>,
    code: &CodeObject,
    at: usize,
    op: Opcode,
    index: u32,
    obj: &Value,
) -> RuntimeResult<MethodRef> {
    let Some(entry) = code.l1_entry(index) else {
        return generic::get_method(obj, &site_name(code, at)?);
    };

    match (op, obj) {
        (Opcode::LoadMethodModule, Value::Module(module)) if entry.is_valid_for(module.id()) => {
            if entry.version() == module.version() {
                if let Some(value) = entry.value() {
                    stats::record_hit(op);
                    return Ok(MethodRef::Bound(value));
                }
            } else if let Some(value) = module.get(entry.name().as_str()) {
                stats::record_slight_miss(op);
                entry.refresh_module(value.clone(), module.version());
                return Ok(MethodRef::Bound(value));
            }
        }
        (Opcode::LoadMethodType, Value::Type(ty)) if entry.is_valid_for(ty.id()) => {
            if let Some(value) = entry.value() {
                stats::record_hit(op);
                return generic::descr_get(&value, None).map(MethodRef::Bound);
            }
        }
        (_, Value::Instance(inst))
            if !matches!(op, Opcode::LoadMethodModule | Opcode::LoadMethodType)
                && entry.is_valid_for(inst.type_object().id()) =>
        {
            let ops = kind_ops(entry.kind());
            debug_assert_eq!(ops.load_method_op, op, "L1 entry {:?} under {}", entry.kind(), op);
            if ops.load_method_op == op {
                stats::record_hit(op);
                return (ops.load_method)(op, &entry, obj, inst);
            }
        }
        _ => {}
    }

    stats::record_miss(op);
    let name = entry.name().clone();
    if !entry.is_valid() && invalidate::cache_hit_invalidate(ctx, code, at, op) {
        return generic::get_method(obj, &name);
    }
    load_method(ctx, code, at, &name, obj)
}

/// 未特化的 `StoreAttr`
pub fn store_attr(
    _ctx: &ShadowContext<'_>,
    code: &CodeObject,
    at: usize,
    name: &Name,
    obj: &Value,
    value: Value,
) -> RuntimeResult<()> {
    let Value::Instance(inst) = obj else {
        resolve::attr_miss(Opcode::StoreAttr, UncacheableReason::UnsupportedReceiver, None);
        return generic::setattr(obj, name, value);
    };
    let ty = inst.type_object();
    if !ty.has_default_setattr() {
        resolve::attr_miss(Opcode::StoreAttr, UncacheableReason::SetattrOverride, Some(ty));
        return generic::setattr(obj, name, value);
    }
    match resolve::get_cache_entry(ty, name) {
        Ok(entry) => {
            let ops = kind_ops(entry.kind());
            match ops.store_attr_op {
                Some(op) => {
                    resolve::patch_or_miss(code, at, op, &entry);
                    (ops.store_attr)(op, &entry, obj, inst, value)
                }
                None => generic::setattr(obj, name, value),
            }
        }
        Err(reason) => {
            resolve::attr_miss(Opcode::StoreAttr, reason, Some(ty));
            generic::setattr(obj, name, value)
        }
    }
}

/// 特化的 `StoreAttr*`（不可缓存版本除外）
pub fn store_attr_cached(
    ctx: &ShadowContext<'_>,
    code: &CodeObject,
    at: usize,
    op: Opcode,
    index: u32,
    obj: &Value,
    value: Value,
) -> RuntimeResult<()> {
    let Some(entry) = code.l1_entry(index) else {
        return generic::setattr(obj, &site_name(code, at)?, value);
    };

    if let Value::Instance(inst) = obj {
        if entry.is_valid_for(inst.type_object().id()) {
            let ops = kind_ops(entry.kind());
            debug_assert_eq!(ops.store_attr_op, Some(op), "L1 entry {:?} under {}", entry.kind(), op);
            if ops.store_attr_op == Some(op) {
                stats::record_hit(op);
                return (ops.store_attr)(op, &entry, obj, inst, value);
            }
        }
    }

    stats::record_miss(op);
    let name = entry.name().clone();
    if !entry.is_valid() && invalidate::cache_hit_invalidate(ctx, code, at, op) {
        return generic::setattr(obj, &name, value);
    }
    store_attr(ctx, code, at, &name, obj, value)
}
