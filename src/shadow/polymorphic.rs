//! Polymorphic attribute cache
//!
//! 单态 `LoadAttr` 调用点遇到另一种类型的接收者时升级为
//! `LoadAttrPolymorphic`：每个调用点一个固定容量的条目数组，
//! 按接收者类型查找；数组满后未见过的类型直接走通用路径（不淘汰）。

use tracing::debug;

use crate::runtime::errors::RuntimeResult;
use crate::runtime::object::{generic, Instance};
use crate::runtime::value::{ObjectId, Value};
use crate::shadow::attr::{kind_ops, site_name};
use crate::shadow::entry::{EntryKind, EntryRef};
use crate::shadow::stats::{self, UncacheableReason};
use crate::shadow::{resolve, rewriter, ShadowContext, ShadowError};
use crate::vm::code::CodeObject;
use crate::vm::opcode::Opcode;

/// 初始容量
const INITIAL_CACHES: usize = 2;

/// 单个调用点的多态缓存
#[derive(Debug)]
pub struct PolymorphicCache {
    entries: Box<[Option<EntryRef>]>,
}

impl PolymorphicCache {
    fn new(size: usize) -> Self {
        Self {
            entries: vec![None; size.max(1)].into_boxed_slice(),
        }
    }

    /// 对该类型有效的条目
    pub fn find(
        &self,
        owner: ObjectId,
    ) -> Option<EntryRef> {
        self.entries
            .iter()
            .flatten()
            .find(|e| e.is_valid_for(owner))
            .cloned()
    }

    /// 空槽位或已失效条目所在的槽位
    pub fn free_slot(&self) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.as_ref().map_or(true, |e| !e.is_valid()))
    }

    fn set(
        &mut self,
        slot: usize,
        entry: &EntryRef,
    ) {
        if let Some(s) = self.entries.get_mut(slot) {
            *s = Some(entry.clone());
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn footprint(&self) -> usize {
        std::mem::size_of::<Self>() + self.entries.len() * std::mem::size_of::<Option<EntryRef>>()
    }

    /// 有效条目数
    pub fn valid(&self) -> usize {
        self.entries.iter().flatten().filter(|e| e.is_valid()).count()
    }
}

/// 函数内全部多态缓存
#[derive(Debug)]
pub struct PolymorphicTable {
    caches: Vec<PolymorphicCache>,
    limit: usize,
}

impl PolymorphicTable {
    pub fn new(limit: usize) -> Self {
        Self {
            caches: Vec::new(),
            limit: limit.clamp(1, 256),
        }
    }

    /// 分配一个多态缓存，`seed` 放入第一个槽位
    pub fn allocate(
        &mut self,
        size: usize,
        seed: &EntryRef,
    ) -> Result<usize, ShadowError> {
        let len = self.caches.len();
        if len >= self.limit {
            return Err(ShadowError::CapacityExceeded(self.limit));
        }
        if len == self.caches.capacity() {
            let target = (len * 2).max(INITIAL_CACHES).min(self.limit);
            self.caches
                .try_reserve_exact(target - len)
                .map_err(|_| ShadowError::OutOfMemory)?;
        }
        let mut cache = PolymorphicCache::new(size);
        cache.set(0, seed);
        stats::add_size(cache.footprint());
        self.caches.push(cache);
        Ok(len)
    }

    /// 撤销最后一次分配
    fn discard(
        &mut self,
        index: usize,
    ) {
        if index + 1 == self.caches.len() {
            if let Some(cache) = self.caches.pop() {
                stats::sub_size(cache.footprint());
            }
        }
    }

    pub fn get(
        &self,
        index: usize,
    ) -> Option<&PolymorphicCache> {
        self.caches.get(index)
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// 内存占用估算
    pub fn footprint(&self) -> usize {
        self.caches.iter().map(PolymorphicCache::footprint).sum()
    }
}

enum Promotion {
    Promoted(usize),
    Rejected,
    Exhausted,
}

/// 把单态调用点升级为多态，并以当前接收者执行一次读取
///
/// 返回 `None` 表示未升级，调用方按普通未命中处理。
pub fn promote(
    ctx: &ShadowContext<'_>,
    code: &CodeObject,
    at: usize,
    entry: &EntryRef,
    obj: &Value,
    inst: &Instance,
) -> Option<RuntimeResult<Value>> {
    if !inst.type_object().has_default_getattr() {
        return None;
    }
    let original = code.original_arg(at);
    let outcome = {
        let mut guard = code.shadow.borrow_mut();
        let shadow = guard.as_mut()?;
        match shadow.polymorphic.allocate(ctx.config.polymorphic_size, entry) {
            Ok(index) => {
                if rewriter::patch(shadow, at, Opcode::LoadAttrPolymorphic, index as u32) {
                    Promotion::Promoted(index)
                } else {
                    shadow.polymorphic.discard(index);
                    Promotion::Rejected
                }
            }
            Err(err) => {
                debug!("'{}' at {}: polymorphic table unavailable: {}", code.name(), at, err);
                rewriter::patch(shadow, at, Opcode::LoadAttrUncachable, original);
                Promotion::Exhausted
            }
        }
    };

    match outcome {
        Promotion::Promoted(index) => {
            debug!(
                "'{}' at {}: '{}' promoted to polymorphic cache #{}",
                code.name(),
                at,
                entry.name(),
                index
            );
            stats::record_entry(Opcode::LoadAttrPolymorphic);
            Some(load_attr_polymorphic(ctx, code, at, index as u32, obj))
        }
        Promotion::Rejected => None,
        Promotion::Exhausted => {
            stats::record_uncacheable(Opcode::LoadAttr, UncacheableReason::TableFull, None);
            Some(generic::getattr(obj, entry.name()))
        }
    }
}

enum Lookup {
    Hit(EntryRef),
    Free(usize),
    Full,
}

/// `LoadAttrPolymorphic`
pub fn load_attr_polymorphic(
    ctx: &ShadowContext<'_>,
    code: &CodeObject,
    at: usize,
    index: u32,
    obj: &Value,
) -> RuntimeResult<Value> {
    let op = Opcode::LoadAttrPolymorphic;
    let Value::Instance(inst) = obj else {
        stats::record_miss(op);
        return generic::getattr(obj, &site_name(code, at)?);
    };
    let ty = inst.type_object();

    let lookup = {
        let shadow = code.shadow.borrow();
        match shadow.as_ref().and_then(|s| s.polymorphic.get(index as usize)) {
            Some(cache) => match cache.find(ty.id()) {
                Some(entry) => Lookup::Hit(entry),
                None => cache.free_slot().map_or(Lookup::Full, Lookup::Free),
            },
            None => Lookup::Full,
        }
    };

    match lookup {
        Lookup::Hit(entry) => {
            stats::record_hit(op);
            (kind_ops(entry.kind()).load_attr)(op, &entry, obj, inst)
        }
        Lookup::Free(slot) if ctx.config.polymorphic => {
            let name = site_name(code, at)?;
            match resolve::get_cache_entry(ty, &name) {
                Ok(entry) if entry.kind() != EntryKind::Module => {
                    if let Some(shadow) = code.shadow.borrow_mut().as_mut() {
                        if let Some(cache) = shadow.polymorphic.caches.get_mut(index as usize) {
                            cache.set(slot, &entry);
                        }
                    }
                    stats::record_entry(op);
                    (kind_ops(entry.kind()).load_attr)(op, &entry, obj, inst)
                }
                Ok(_) => generic::getattr(obj, &name),
                Err(reason) => {
                    resolve::attr_miss(op, reason, Some(ty));
                    generic::getattr(obj, &name)
                }
            }
        }
        _ => {
            stats::record_miss(op);
            generic::getattr(obj, &site_name(code, at)?)
        }
    }
}
