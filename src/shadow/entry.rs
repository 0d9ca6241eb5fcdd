//! Cache entries
//!
//! 缓存条目描述一种已解析的属性访问策略。条目被 L2 注册表与各函数的
//! L1 槽位共享（`Rc` 计数）。失效只清空所有者等字段，从不释放仍被引用的条目。

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::runtime::object::SharedKeys;
use crate::runtime::value::{Name, ObjectId, Value};

/// 条目策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// 可写固定槽位
    Slot,
    /// 无实例字典，数据描述符或普通类属性
    NoDictDescr,
    /// 无实例字典，方法
    NoDictMethod,
    /// 实例字典（combined），类型上无同名属性
    DictNoDescr,
    /// 实例字典（combined），回落到非数据描述符
    DictDescr,
    /// 实例字典（combined），回落到方法
    DictMethod,
    /// 共享键字典，类型上无同名属性
    SplitDict,
    /// 共享键字典，回落到非数据描述符
    SplitDictDescr,
    /// 共享键字典，回落到方法
    SplitDictMethod,
    /// 模块属性
    Module,
}

impl EntryKind {
    pub const COUNT: usize = 10;

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn is_split(&self) -> bool {
        matches!(
            self,
            EntryKind::SplitDict | EntryKind::SplitDictDescr | EntryKind::SplitDictMethod
        )
    }
}

/// 共享键字典的布局快照
#[derive(Debug, Clone)]
pub struct SplitLayout {
    /// 键表身份
    pub keys: Rc<SharedKeys>,
    /// 名称在键表中的位置；`None` 表示解析时不存在
    pub index: Option<usize>,
    /// 解析时的键表指纹
    pub fingerprint: usize,
}

impl SplitLayout {
    /// 对键表拍摄快照
    pub fn probe(
        keys: &Rc<SharedKeys>,
        name: &str,
    ) -> Self {
        Self {
            keys: keys.clone(),
            index: keys.index_of(name),
            fingerprint: keys.fingerprint(),
        }
    }
}

/// 缓存条目
#[derive(Debug)]
pub struct CacheEntry {
    kind: EntryKind,
    name: Name,
    /// 所有者身份（非拥有）；`None` 表示已失效
    owner: Cell<Option<ObjectId>>,
    offset: usize,
    value: RefCell<Option<Value>>,
    split: RefCell<Option<SplitLayout>>,
    version: Cell<u64>,
}

/// 共享的条目引用
pub type EntryRef = Rc<CacheEntry>;

impl CacheEntry {
    fn new(
        kind: EntryKind,
        owner: ObjectId,
        name: &Name,
    ) -> Self {
        Self {
            kind,
            name: name.clone(),
            owner: Cell::new(Some(owner)),
            offset: 0,
            value: RefCell::new(None),
            split: RefCell::new(None),
            version: Cell::new(0),
        }
    }

    /// 固定槽位条目
    pub fn slot(
        owner: ObjectId,
        name: &Name,
        offset: usize,
        descr: Value,
    ) -> EntryRef {
        Rc::new(Self {
            offset,
            value: RefCell::new(Some(descr)),
            ..Self::new(EntryKind::Slot, owner, name)
        })
    }

    /// 描述符 / 字典条目
    pub fn descr(
        kind: EntryKind,
        owner: ObjectId,
        name: &Name,
        descr: Option<Value>,
    ) -> EntryRef {
        debug_assert!(!kind.is_split() && kind != EntryKind::Slot && kind != EntryKind::Module);
        let entry = Self::new(kind, owner, name);
        *entry.value.borrow_mut() = descr;
        Rc::new(entry)
    }

    /// 共享键字典条目
    pub fn split(
        kind: EntryKind,
        owner: ObjectId,
        name: &Name,
        layout: SplitLayout,
        descr: Option<Value>,
    ) -> EntryRef {
        debug_assert!(kind.is_split());
        let entry = Self::new(kind, owner, name);
        *entry.value.borrow_mut() = descr;
        *entry.split.borrow_mut() = Some(layout);
        Rc::new(entry)
    }

    /// 模块属性条目
    pub fn module(
        owner: ObjectId,
        name: &Name,
        value: Value,
        version: u64,
    ) -> EntryRef {
        let entry = Self::new(EntryKind::Module, owner, name);
        *entry.value.borrow_mut() = Some(value);
        entry.version.set(version);
        Rc::new(entry)
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn owner(&self) -> Option<ObjectId> {
        self.owner.get()
    }

    pub fn is_valid(&self) -> bool {
        self.owner.get().is_some()
    }

    /// 对该所有者有效
    pub fn is_valid_for(
        &self,
        owner: ObjectId,
    ) -> bool {
        self.owner.get() == Some(owner)
    }

    /// 使条目失效：清空所有者与缓存的引用
    pub fn invalidate(&self) {
        self.owner.set(None);
        let value = self.value.borrow_mut().take();
        let split = self.split.borrow_mut().take();
        drop(value);
        drop(split);
    }

    /// 槽位偏移
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 回落描述符 / 模块值
    pub fn value(&self) -> Option<Value> {
        self.value.borrow().clone()
    }

    /// 共享键布局快照
    pub fn split_layout(&self) -> Option<SplitLayout> {
        self.split.borrow().clone()
    }

    /// 在布局快照上执行 `f`
    pub fn with_split<R>(
        &self,
        f: impl FnOnce(&SplitLayout) -> R,
    ) -> Option<R> {
        self.split.borrow().as_ref().map(f)
    }

    /// 用新的键表刷新布局快照
    pub fn refresh_split(
        &self,
        keys: &Rc<SharedKeys>,
    ) {
        if !self.is_valid() {
            return;
        }
        *self.split.borrow_mut() = Some(SplitLayout::probe(keys, self.name.as_str()));
    }

    /// 模块版本
    pub fn version(&self) -> u64 {
        self.version.get()
    }

    /// 刷新模块值与版本
    pub fn refresh_module(
        &self,
        value: Value,
        version: u64,
    ) {
        if !self.is_valid() {
            return;
        }
        let previous = self.value.borrow_mut().replace(value);
        self.version.set(version);
        drop(previous);
    }
}
