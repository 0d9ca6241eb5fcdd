//! Invalidation coordinator and miss policy
//!
//! - 类型被修改（自身或祖先）：L2 中所有条目失效，依赖它的元类型条目失效
//! - 注册表失效次数超过阈值：该类型永久停止缓存
//! - 所有者销毁：强制失效并拆除注册表
//! - 缓存指令下的条目反复失效：调用点改写为不可缓存版本

use std::rc::Rc;

use tracing::{debug, warn};

use crate::runtime::object::TypeObject;
use crate::runtime::value::{Name, ObjectId};
use crate::shadow::entry::EntryRef;
use crate::shadow::registry::{CacheOwner, CacheRef};
use crate::shadow::{rewriter, stats, ShadowContext};
use crate::vm::code::CodeObject;
use crate::vm::opcode::Opcode;

/// 使注册表中的全部条目失效
///
/// 已停用的注册表只在 `force` 时处理。
pub fn invalidate_caches(
    cache: &CacheRef,
    force: bool,
) {
    if cache.is_disabled() && !force {
        invalidate_type_insts(cache);
        return;
    }

    if let Some(entries) = cache.take_entries() {
        for entry in entries.values() {
            entry.invalidate();
        }
    }
    invalidate_type_insts(cache);

    if !force && cache.bump_invalidate_count() {
        warn!(
            "type '{}' invalidated {} times, caching disabled",
            cache.owner_name(),
            cache.invalidate_count()
        );
    }
}

fn invalidate_type_insts(cache: &CacheRef) {
    if let Some(insts) = cache.take_type_insts() {
        for entries in insts.values() {
            for entry in entries.values() {
                entry.invalidate();
            }
        }
    }
}

/// 类型（或其祖先）被修改
pub fn type_modified(ty: &TypeObject) {
    if let Some(cache) = ty.cache() {
        unregister_from_meta(&cache);
        invalidate_caches(&cache, false);
    }
    for subclass in ty.subclasses() {
        type_modified(&subclass);
    }
}

/// 所有者被销毁（或显式拆除注册表）
pub fn owner_collected(cache: &Rc<CacheRef>) {
    debug!("cache registry for '{}' torn down", cache.owner_name());
    unregister_from_meta(cache);
    invalidate_caches(cache, true);
}

fn unregister_from_meta(cache: &CacheRef) {
    if let Some(meta) = cache.take_meta() {
        if let Some(entries) = meta.remove_type_inst(cache.owner()) {
            for entry in entries.values() {
                entry.invalidate();
            }
        }
    }
}

/// 记录元类型依赖：修改元类型时，类型 `ty` 上的属性条目随之失效
///
/// 元类型注册表已停用时返回 `false`，调用方不得缓存该条目。
pub fn register_meta_relationship(
    ty: &TypeObject,
    meta: &TypeObject,
    name: &Name,
    entry: &EntryRef,
) -> bool {
    let Some(meta_cache) = meta.get_or_create_cache() else {
        return false;
    };
    let Some(cache) = ty.get_or_create_cache() else {
        return false;
    };
    meta_cache.add_type_inst(ty.id(), name, entry);
    cache.set_meta(&meta_cache);
    true
}

/// 依赖某元类型的类型数量（诊断用）
pub fn meta_dependents(meta: &TypeObject) -> usize {
    meta.cache().map_or(0, |c| c.type_inst_count())
}

/// 缓存指令下的条目已失效
///
/// 累加函数的失效计数；超过阈值时把调用点改写为不可缓存版本并返回 `true`。
pub fn cache_hit_invalidate(
    ctx: &ShadowContext<'_>,
    code: &CodeObject,
    at: usize,
    op: Opcode,
) -> bool {
    let original = code.original_arg(at);
    let mut guard = code.shadow.borrow_mut();
    let Some(shadow) = guard.as_mut() else {
        return false;
    };
    shadow.update_count = shadow.update_count.saturating_add(1);
    if shadow.update_count <= ctx.config.miss_threshold {
        return false;
    }
    let Some(uncachable) = op.uncachable() else {
        return false;
    };
    if rewriter::patch(shadow, at, uncachable, original) {
        debug!(
            "'{}' at {}: {} deoptimized after {} invalidations",
            code.name(),
            at,
            op,
            shadow.update_count
        );
        stats::record_uncacheable(op, stats::UncacheableReason::TooManyMisses, None);
        return true;
    }
    false
}

/// 对象身份是否仍注册在元类型依赖中（测试与诊断用）
pub fn is_meta_dependent(
    meta: &TypeObject,
    ty: ObjectId,
) -> bool {
    meta.cache().is_some_and(|c| c.has_type_inst(ty))
}
