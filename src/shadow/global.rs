//! Global variable cache
//!
//! 每个函数按不同的全局名称分配条目。条目有效当且仅当其版本等于
//! 模块命名空间与内置命名空间当前版本中的较大者；两者的版本取自
//! 同一个进程级单调计数器，任一命名空间的修改都会产生更大的版本。

use crate::runtime::errors::{RuntimeError, RuntimeResult};
use crate::runtime::value::{Name, Value};
use crate::shadow::{rewriter, stats, ShadowContext};
use crate::vm::code::CodeObject;
use crate::vm::opcode::Opcode;

/// 全局缓存条目
#[derive(Debug, Clone)]
pub struct GlobalEntry {
    pub name: Name,
    pub value: Option<Value>,
    pub version: u64,
}

/// 函数的全局缓存
#[derive(Debug, Default)]
pub struct GlobalCache {
    entries: Vec<GlobalEntry>,
    /// 名称表索引 → 条目索引
    by_name: Vec<Option<u32>>,
}

impl GlobalCache {
    /// 扫描规范指令流中的 `LoadGlobal`，为每个不同的名称分配条目
    pub fn for_code(code: &CodeObject) -> Self {
        let mut cache = Self {
            entries: Vec::new(),
            by_name: vec![None; code.names().len()],
        };
        let mut ext = 0u32;
        for unit in code.code() {
            let arg = (ext << 8) | unit.arg as u32;
            match unit.opcode() {
                Some(Opcode::ExtendedArg) => {
                    ext = arg;
                    continue;
                }
                Some(Opcode::LoadGlobal) => {
                    let index = arg as usize;
                    if let (Some(slot), Some(name)) = (cache.by_name.get_mut(index), code.names().get(index)) {
                        if slot.is_none() {
                            *slot = Some(cache.entries.len() as u32);
                            cache.entries.push(GlobalEntry {
                                name: name.clone(),
                                value: None,
                                version: 0,
                            });
                        }
                    }
                }
                _ => {}
            }
            ext = 0;
        }
        cache
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(
        &self,
        index: usize,
    ) -> Option<&GlobalEntry> {
        self.entries.get(index)
    }

    /// 名称表索引对应的条目索引
    pub fn slot_for_name(
        &self,
        names_index: usize,
    ) -> Option<u32> {
        self.by_name.get(names_index).copied().flatten()
    }

    fn fill(
        &mut self,
        index: usize,
        value: Value,
        version: u64,
    ) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.value = Some(value);
            entry.version = version;
        }
    }

    /// 内存占用估算
    pub fn footprint(&self) -> usize {
        self.entries.len() * std::mem::size_of::<GlobalEntry>()
            + self.by_name.len() * std::mem::size_of::<Option<u32>>()
    }
}

/// 模块与内置命名空间的组合版本
pub fn combined_version(
    ctx: &ShadowContext<'_>,
    code: &CodeObject,
) -> u64 {
    code.module().version().max(ctx.builtins.version())
}

/// 按模块 → 内置的顺序查找全局名称
pub fn lookup(
    ctx: &ShadowContext<'_>,
    code: &CodeObject,
    name: &str,
) -> Option<Value> {
    code.module().get(name).or_else(|| ctx.builtins.get(name))
}

/// 未特化的 `LoadGlobal`：查找并把调用点改写为 `LoadGlobalCached`
pub fn load_global(
    ctx: &ShadowContext<'_>,
    code: &CodeObject,
    at: usize,
    names_index: u32,
) -> RuntimeResult<Value> {
    let name = code
        .names()
        .get(names_index as usize)
        .cloned()
        .ok_or_else(|| RuntimeError::NameError(format!("<name #{}>", names_index)))?;
    let value = lookup(ctx, code, name.as_str()).ok_or_else(|| RuntimeError::NameError(name.to_string()))?;
    let version = combined_version(ctx, code);

    let mut guard = code.shadow.borrow_mut();
    if let Some(shadow) = guard.as_mut() {
        if let Some(slot) = shadow.globals.slot_for_name(names_index as usize) {
            shadow.globals.fill(slot as usize, value.clone(), version);
            if rewriter::patch(shadow, at, Opcode::LoadGlobalCached, slot) {
                stats::record_entry(Opcode::LoadGlobalCached);
            } else {
                stats::record_uncacheable(Opcode::LoadGlobal, stats::UncacheableReason::PatchRejected, None);
            }
        }
    }
    Ok(value)
}

/// `LoadGlobalCached`：版本一致时直接返回，否则原地重新解析
///
/// 名称已不存在时把调用点改回 `LoadGlobal` 并抛出 `NameError`。
pub fn load_global_cached(
    ctx: &ShadowContext<'_>,
    code: &CodeObject,
    at: usize,
    index: u32,
) -> RuntimeResult<Value> {
    let version = combined_version(ctx, code);
    let cached = code.shadow.borrow().as_ref().and_then(|shadow| {
        shadow
            .globals
            .get(index as usize)
            .map(|e| (e.name.clone(), e.value.clone().filter(|_| e.version == version)))
    });

    let name = match cached {
        Some((_, Some(value))) => {
            stats::record_hit(Opcode::LoadGlobalCached);
            return Ok(value);
        }
        Some((name, None)) => name,
        None => {
            // 影子字节码已被丢弃
            return original_global(ctx, code, at);
        }
    };

    match lookup(ctx, code, name.as_str()) {
        Some(value) => {
            stats::record_slight_miss(Opcode::LoadGlobalCached);
            if let Some(shadow) = code.shadow.borrow_mut().as_mut() {
                shadow.globals.fill(index as usize, value.clone(), version);
            }
            Ok(value)
        }
        None => {
            stats::record_miss(Opcode::LoadGlobalCached);
            let original = code.original_arg(at);
            if let Some(shadow) = code.shadow.borrow_mut().as_mut() {
                rewriter::patch(shadow, at, Opcode::LoadGlobal, original);
            }
            Err(RuntimeError::NameError(name.to_string()))
        }
    }
}

/// 不经缓存的全局读取
pub fn original_global(
    ctx: &ShadowContext<'_>,
    code: &CodeObject,
    at: usize,
) -> RuntimeResult<Value> {
    let name = code
        .original_name(at)
        .ok_or_else(|| RuntimeError::NameError(format!("<name #{}>", code.original_arg(at))))?;
    lookup(ctx, code, name.as_str()).ok_or_else(|| RuntimeError::NameError(name.to_string()))
}
