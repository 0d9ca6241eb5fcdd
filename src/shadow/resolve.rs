//! Cache entry resolution
//!
//! 根据接收者类型与属性名选择访问策略，注册到类型的 L2 注册表，
//! 再由调用点放入 L1 槽位并改写指令。

use tracing::trace;

use crate::runtime::object::{Module, TypeObject};
use crate::runtime::value::{Name, Value};
use crate::shadow::entry::{CacheEntry, EntryKind, EntryRef, SplitLayout};
use crate::shadow::registry::CacheOwner;
use crate::shadow::stats::{self, UncacheableReason};
use crate::shadow::{invalidate, rewriter};
use crate::vm::code::CodeObject;
use crate::vm::opcode::Opcode;

/// 解析实例属性的访问策略（不经过 L2）
///
/// 返回 `None` 表示不可缓存。
pub fn load_cache_info(
    ty: &TypeObject,
    name: &Name,
) -> Option<EntryRef> {
    if !ty.has_default_getattr() {
        return None;
    }
    let owner = ty.id();
    let descr = ty.lookup(name.as_str());

    if let Some(d) = descr.as_ref().filter(|d| d.is_data_descriptor()) {
        if let Value::Member(member) = d {
            if !member.readonly {
                return Some(CacheEntry::slot(owner, name, member.offset, d.clone()));
            }
        }
        return Some(CacheEntry::descr(EntryKind::NoDictDescr, owner, name, descr));
    }

    let is_method = descr.as_ref().is_some_and(Value::is_method);
    if ty.has_dict() {
        if let Some(keys) = ty.cached_keys() {
            let kind = match &descr {
                None => EntryKind::SplitDict,
                Some(_) if is_method => EntryKind::SplitDictMethod,
                Some(_) => EntryKind::SplitDictDescr,
            };
            let layout = SplitLayout::probe(&keys, name.as_str());
            return Some(CacheEntry::split(kind, owner, name, layout, descr));
        }
        let kind = match &descr {
            None => EntryKind::DictNoDescr,
            Some(_) if is_method => EntryKind::DictMethod,
            Some(_) => EntryKind::DictDescr,
        };
        return Some(CacheEntry::descr(kind, owner, name, descr));
    }

    match descr {
        Some(_) if is_method => Some(CacheEntry::descr(EntryKind::NoDictMethod, owner, name, descr)),
        Some(_) => Some(CacheEntry::descr(EntryKind::NoDictDescr, owner, name, descr)),
        None => None,
    }
}

/// 取得（或解析并注册）实例属性的缓存条目
pub fn get_cache_entry(
    ty: &TypeObject,
    name: &Name,
) -> Result<EntryRef, UncacheableReason> {
    if !ty.has_default_getattr() {
        return Err(UncacheableReason::GetattrOverride);
    }
    let cache = ty.get_or_create_cache().ok_or(UncacheableReason::CacheDisabled)?;
    if let Some(entry) = cache.get(name.as_str()).filter(|e| e.is_valid()) {
        return Ok(entry);
    }
    let entry = load_cache_info(ty, name).ok_or(UncacheableReason::Unresolvable)?;
    trace!("resolved {}.{} as {:?}", ty.name(), name, entry.kind());
    cache.add(name, &entry);
    Ok(entry)
}

/// 取得类型对象自身属性（`T.x`）的缓存条目
///
/// 元类型存在同名数据描述符或自定义协议时不缓存；
/// 有元类型时登记依赖，修改元类型会使条目失效。
pub fn get_type_attr_entry(
    ty: &TypeObject,
    name: &Name,
) -> Result<EntryRef, UncacheableReason> {
    if let Some(meta) = ty.metatype() {
        if !meta.has_default_getattr()
            || meta
                .lookup(name.as_str())
                .is_some_and(|d| d.is_data_descriptor())
        {
            return Err(UncacheableReason::MetaConflict);
        }
    }
    let entry = get_cache_entry(ty, name)?;
    if entry.value().is_none() {
        return Err(UncacheableReason::Unresolvable);
    }
    if let Some(meta) = ty.metatype() {
        if !invalidate::register_meta_relationship(ty, meta, name, &entry) {
            return Err(UncacheableReason::CacheDisabled);
        }
    }
    Ok(entry)
}

/// 取得模块属性的缓存条目
///
/// 版本过期的条目原地刷新，其他调用点持有的引用保持有效。
pub fn get_module_entry(
    module: &Module,
    name: &Name,
) -> Result<EntryRef, UncacheableReason> {
    let cache = module.get_or_create_cache().ok_or(UncacheableReason::CacheDisabled)?;
    let value = module.get(name.as_str()).ok_or(UncacheableReason::Unresolvable)?;
    if let Some(entry) = cache.get(name.as_str()).filter(|e| e.is_valid()) {
        if entry.version() != module.version() {
            entry.refresh_module(value, module.version());
        }
        return Ok(entry);
    }
    let entry = CacheEntry::module(module.id(), name, value, module.version());
    cache.add(name, &entry);
    Ok(entry)
}

/// 把条目放入 L1 并改写调用点
///
/// 槽位表无法增长时调用点改写为不可缓存版本。返回是否完成特化。
pub fn patch_or_miss(
    code: &CodeObject,
    at: usize,
    op: Opcode,
    entry: &EntryRef,
) -> bool {
    let original = code.original_arg(at);
    let mut guard = code.shadow.borrow_mut();
    let Some(shadow) = guard.as_mut() else {
        return false;
    };
    match shadow.l1.find_or_add(entry) {
        Ok(index) => {
            shadow.l1.retain(index);
            if rewriter::patch(shadow, at, op, index as u32) {
                stats::record_entry(op);
                return true;
            }
            let released = shadow.l1.release(index);
            drop(guard);
            drop(released);
            stats::record_uncacheable(op, UncacheableReason::PatchRejected, None);
            false
        }
        Err(err) => {
            trace!("'{}' at {}: {}", code.name(), at, err);
            if let Some(uncachable) = op.uncachable() {
                rewriter::patch(shadow, at, uncachable, original);
            }
            drop(guard);
            stats::record_uncacheable(op, UncacheableReason::TableFull, None);
            false
        }
    }
}

/// 记录一次不可缓存的访问
pub fn attr_miss(
    op: Opcode,
    reason: UncacheableReason,
    ty: Option<&TypeObject>,
) {
    stats::record_uncacheable(op, reason, ty.map(|t| t.name().as_str()));
}
