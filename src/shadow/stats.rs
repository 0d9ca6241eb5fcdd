//! Cache diagnostics
//!
//! 进程级计数器（原子变量）。`snapshot` 读取当前值，`take` 读取后清零操作码计数。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;

use crate::vm::opcode::Opcode;

/// 单个操作码的计数
pub struct OpcodeCounters {
    hits: AtomicU64,
    slight_misses: AtomicU64,
    misses: AtomicU64,
    uncacheable: AtomicU64,
    entries: AtomicU64,
}

impl OpcodeCounters {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: OpcodeCounters = OpcodeCounters {
        hits: AtomicU64::new(0),
        slight_misses: AtomicU64::new(0),
        misses: AtomicU64::new(0),
        uncacheable: AtomicU64::new(0),
        entries: AtomicU64::new(0),
    };

    fn load(&self) -> OpcodeStats {
        OpcodeStats {
            hits: self.hits.load(Ordering::Relaxed),
            slight_misses: self.slight_misses.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            uncacheable: self.uncacheable.load(Ordering::Relaxed),
            entries: self.entries.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.slight_misses.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.uncacheable.store(0, Ordering::Relaxed);
        self.entries.store(0, Ordering::Relaxed);
    }
}

static OPCODE_STATS: [OpcodeCounters; 256] = [OpcodeCounters::INIT; 256];

/// 存活的 L2 注册表数量
static CACHE_COUNT: AtomicUsize = AtomicUsize::new(0);
/// 影子字节码与缓存表占用的字节数
static TOTAL_SIZE: AtomicUsize = AtomicUsize::new(0);

/// 不可缓存的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UncacheableReason {
    /// 类型覆盖了属性读取协议
    GetattrOverride,
    /// 类型覆盖了属性写入协议
    SetattrOverride,
    /// 属性无法解析为任何策略
    Unresolvable,
    /// 注册表已停用
    CacheDisabled,
    /// 缓存表无法增长
    TableFull,
    /// 元类型存在同名数据描述符或自定义协议
    MetaConflict,
    /// 改写被拒绝（新编码更宽）
    PatchRejected,
    /// 缓存条目反复失效
    TooManyMisses,
    /// 接收者类型不受支持
    UnsupportedReceiver,
}

impl UncacheableReason {
    pub const COUNT: usize = 9;

    pub const ALL: [UncacheableReason; Self::COUNT] = [
        UncacheableReason::GetattrOverride,
        UncacheableReason::SetattrOverride,
        UncacheableReason::Unresolvable,
        UncacheableReason::CacheDisabled,
        UncacheableReason::TableFull,
        UncacheableReason::MetaConflict,
        UncacheableReason::PatchRejected,
        UncacheableReason::TooManyMisses,
        UncacheableReason::UnsupportedReceiver,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UncacheableReason::GetattrOverride => "getattr_override",
            UncacheableReason::SetattrOverride => "setattr_override",
            UncacheableReason::Unresolvable => "unresolvable",
            UncacheableReason::CacheDisabled => "cache_disabled",
            UncacheableReason::TableFull => "table_full",
            UncacheableReason::MetaConflict => "meta_conflict",
            UncacheableReason::PatchRejected => "patch_rejected",
            UncacheableReason::TooManyMisses => "too_many_misses",
            UncacheableReason::UnsupportedReceiver => "unsupported_receiver",
        }
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicU64 = AtomicU64::new(0);
static UNCACHEABLE_REASONS: [AtomicU64; UncacheableReason::COUNT] = [ZERO; UncacheableReason::COUNT];

/// 按类型名单独统计的类型数上限
pub const MAX_TRACKED_TYPES: usize = 256;
/// 超出上限的类型合并计入的键
pub const OTHER_TYPES: &str = "<other>";

/// 按类型名统计的不可缓存次数
static TYPE_UNCACHEABLE: Lazy<Mutex<HashMap<String, u64>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn counters(op: Opcode) -> &'static OpcodeCounters {
    &OPCODE_STATS[op as u8 as usize]
}

pub fn record_hit(op: Opcode) {
    counters(op).hits.fetch_add(1, Ordering::Relaxed);
}

/// 命中但需要刷新条目（布局或版本变化）
pub fn record_slight_miss(op: Opcode) {
    counters(op).slight_misses.fetch_add(1, Ordering::Relaxed);
}

pub fn record_miss(op: Opcode) {
    counters(op).misses.fetch_add(1, Ordering::Relaxed);
}

/// 新建了特化
pub fn record_entry(op: Opcode) {
    counters(op).entries.fetch_add(1, Ordering::Relaxed);
}

pub fn record_uncacheable(
    op: Opcode,
    reason: UncacheableReason,
    type_name: Option<&str>,
) {
    counters(op).uncacheable.fetch_add(1, Ordering::Relaxed);
    UNCACHEABLE_REASONS[reason as usize].fetch_add(1, Ordering::Relaxed);
    if let Some(type_name) = type_name {
        let mut types = TYPE_UNCACHEABLE.lock();
        let key = if types.contains_key(type_name) || types.len() < MAX_TRACKED_TYPES {
            type_name
        } else {
            OTHER_TYPES
        };
        *types.entry(key.to_string()).or_insert(0) += 1;
    }
}

pub(crate) fn registry_created() {
    CACHE_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn registry_dropped() {
    CACHE_COUNT.fetch_sub(1, Ordering::Relaxed);
}

pub(crate) fn add_size(bytes: usize) {
    TOTAL_SIZE.fetch_add(bytes, Ordering::Relaxed);
}

/// 释放的字节数不得超过已登记的字节数
pub(crate) fn sub_size(bytes: usize) {
    let result = TOTAL_SIZE.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(bytes));
    if let Err(current) = result {
        debug_assert!(false, "size accounting underflow: releasing {} of {} bytes", bytes, current);
        TOTAL_SIZE.store(0, Ordering::Relaxed);
    }
}

/// 单个操作码的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpcodeStats {
    pub hits: u64,
    pub slight_misses: u64,
    pub misses: u64,
    pub uncacheable: u64,
    pub entries: u64,
}

impl OpcodeStats {
    fn is_empty(&self) -> bool {
        *self == OpcodeStats::default()
    }
}

/// 统计快照
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// 存活的 L2 注册表数量
    pub cache_count: usize,
    /// 影子字节码与缓存表占用的字节数
    pub total_size: usize,
    /// 按操作码名称的计数（只包含非零项）
    pub opcodes: BTreeMap<String, OpcodeStats>,
    /// 按原因的不可缓存次数
    pub uncacheable_reasons: BTreeMap<String, u64>,
    /// 按类型名的不可缓存次数
    pub type_uncacheable: BTreeMap<String, u64>,
}

impl CacheStats {
    /// 某个操作码的计数
    pub fn opcode(
        &self,
        op: Opcode,
    ) -> OpcodeStats {
        self.opcodes.get(op.name()).copied().unwrap_or_default()
    }
}

/// 读取当前统计
pub fn snapshot() -> CacheStats {
    let opcodes = Opcode::ALL
        .iter()
        .map(|op| (op.name().to_string(), counters(*op).load()))
        .filter(|(_, stats)| !stats.is_empty())
        .collect();
    let uncacheable_reasons = UncacheableReason::ALL
        .iter()
        .map(|r| (r.as_str().to_string(), UNCACHEABLE_REASONS[*r as usize].load(Ordering::Relaxed)))
        .filter(|(_, n)| *n > 0)
        .collect();
    let type_uncacheable = TYPE_UNCACHEABLE
        .lock()
        .iter()
        .map(|(k, v)| (k.clone(), *v))
        .collect();
    CacheStats {
        cache_count: CACHE_COUNT.load(Ordering::Relaxed),
        total_size: TOTAL_SIZE.load(Ordering::Relaxed),
        opcodes,
        uncacheable_reasons,
        type_uncacheable,
    }
}

/// 读取统计并清零事件计数（注册表数量与占用字节数是当前状态，不清零）
pub fn take() -> CacheStats {
    let stats = snapshot();
    for counters in OPCODE_STATS.iter() {
        counters.reset();
    }
    for reason in UNCACHEABLE_REASONS.iter() {
        reason.store(0, Ordering::Relaxed);
    }
    TYPE_UNCACHEABLE.lock().clear();
    stats
}
