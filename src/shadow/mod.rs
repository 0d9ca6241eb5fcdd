//! Shadow bytecode - adaptive inline caching
//!
//! 每个函数在预热后获得一份私有的可变指令流副本（影子字节码）。
//! 属性读写、方法读取、全局读取与下标指令在首次执行时观察操作数的
//! 实际形态，并把这一条指令原地改写为绑定缓存条目的特化指令；
//! 通用路径始终是正确的回退。
//!
//! 组成：
//! - [`rewriter`]：有界的原地改写
//! - [`entry`]：缓存条目
//! - [`l1`]：函数级缓存槽位表
//! - [`registry`]：类型/模块级缓存注册表（L2）
//! - [`polymorphic`]：多态缓存
//! - [`global`]：全局变量缓存
//! - [`invalidate`]：失效协调与去优化策略
//! - [`resolve`]：缓存策略解析
//! - [`attr`]、[`subscr`]：分派循环调用的处理函数
//! - [`stats`]：诊断计数

pub mod attr;
pub mod entry;
pub mod global;
pub mod invalidate;
pub mod l1;
pub mod polymorphic;
pub mod registry;
pub mod resolve;
pub mod rewriter;
pub mod stats;
pub mod subscr;

use thiserror::Error;

use crate::runtime::object::{Module, Namespace, TypeObject};
use crate::util::config::ShadowConfig;
use crate::vm::code::CodeObject;
use crate::vm::instructions::CodeUnit;

use global::GlobalCache;
use l1::L1Cache;
use polymorphic::PolymorphicTable;
use registry::CacheOwner;

/// 缓存表增长失败
///
/// 从不暴露给用户代码：调用点改写为不可缓存版本，走通用路径。
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ShadowError {
    #[error("cache table is full ({0} slots)")]
    CapacityExceeded(usize),

    #[error("cache table allocation failed")]
    OutOfMemory,
}

/// 函数的影子字节码与缓存表
#[derive(Debug)]
pub struct ShadowCode {
    /// 影子指令流（与规范指令流等长）
    pub(crate) code: Vec<CodeUnit>,
    pub(crate) l1: L1Cache,
    pub(crate) polymorphic: PolymorphicTable,
    pub(crate) globals: GlobalCache,
    /// 缓存指令下条目失效的次数
    pub(crate) update_count: u32,
}

impl ShadowCode {
    fn new(
        code: &CodeObject,
        config: &ShadowConfig,
    ) -> Self {
        Self {
            code: code.code().to_vec(),
            l1: L1Cache::new(config.max_cache_slots),
            polymorphic: PolymorphicTable::new(config.max_cache_slots),
            globals: GlobalCache::for_code(code),
            update_count: 0,
        }
    }

    /// 内存占用估算
    pub fn footprint(&self) -> usize {
        self.code.len() * std::mem::size_of::<CodeUnit>()
            + self.l1.footprint()
            + self.polymorphic.footprint()
            + self.globals.footprint()
    }
}

impl Drop for ShadowCode {
    fn drop(&mut self) {
        stats::sub_size(self.footprint());
    }
}

/// 处理函数的执行上下文
#[derive(Debug, Clone, Copy)]
pub struct ShadowContext<'a> {
    pub config: &'a ShadowConfig,
    pub builtins: &'a Namespace,
}

/// 为函数创建影子字节码
///
/// 已存在或缓存被禁用时返回 `false`。
pub fn init_cache(
    code: &CodeObject,
    config: &ShadowConfig,
) -> bool {
    if !config.enabled || code.has_shadow() {
        return false;
    }
    let shadow = ShadowCode::new(code, config);
    stats::add_size(shadow.footprint());
    tracing::debug!(
        "shadow code created for '{}' ({} units, {} globals)",
        code.name(),
        shadow.code.len(),
        shadow.globals.len()
    );
    *code.shadow.borrow_mut() = Some(shadow);
    true
}

/// 丢弃函数的影子字节码、L1、全局与多态缓存
pub fn clear_code_cache(code: &CodeObject) {
    let shadow = code.shadow.borrow_mut().take();
    if shadow.is_some() {
        tracing::debug!("shadow code cleared for '{}'", code.name());
    }
    drop(shadow);
}

/// 立即拆除类型的 L2 注册表
pub fn clear_type_cache(ty: &TypeObject) {
    let cache = ty.cache_slot().borrow_mut().take();
    if let Some(cache) = cache {
        invalidate::owner_collected(&cache);
    }
}

/// 立即拆除模块的 L2 注册表
pub fn clear_module_cache(module: &Module) {
    let cache = CacheOwner::cache_slot(module).borrow_mut().take();
    if let Some(cache) = cache {
        invalidate::owner_collected(&cache);
    }
}

#[cfg(test)]
mod tests;
