//! Type/module cache registry (L2)
//!
//! 每个类型或模块按需创建一个注册表：名称 → 缓存条目。
//! 注册表由所有者独占，随所有者一起销毁。条目只向下引用，
//! 元类型依赖索引以对象身份为键，不持有被依赖的类型。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::runtime::object::{Module, TypeObject};
use crate::runtime::value::{Name, ObjectId};
use crate::shadow::entry::EntryRef;
use crate::shadow::stats;

/// 失效次数超过该值后，类型永久停止缓存
pub const CACHE_UPDATE_DISABLE_THRESHOLD: u32 = 1000;

/// 缓存注册表
pub struct CacheRef {
    owner: ObjectId,
    owner_name: Name,
    l2: RefCell<Option<HashMap<Name, EntryRef>>>,
    invalidate_count: Cell<u32>,
    disabled: Cell<bool>,
    /// 以本类型为元类型的类型：类型身份 → 名称 → 条目
    type_insts: RefCell<Option<HashMap<ObjectId, HashMap<Name, EntryRef>>>>,
    /// 本类型的元类型注册表
    meta: RefCell<Option<Weak<CacheRef>>>,
}

impl CacheRef {
    fn new(
        owner: ObjectId,
        owner_name: &Name,
    ) -> Rc<Self> {
        stats::registry_created();
        Rc::new(Self {
            owner,
            owner_name: owner_name.clone(),
            l2: RefCell::new(None),
            invalidate_count: Cell::new(0),
            disabled: Cell::new(false),
            type_insts: RefCell::new(None),
            meta: RefCell::new(None),
        })
    }

    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    pub fn owner_name(&self) -> &Name {
        &self.owner_name
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.get()
    }

    pub fn invalidate_count(&self) -> u32 {
        self.invalidate_count.get()
    }

    /// 查找条目
    pub fn get(
        &self,
        name: &str,
    ) -> Option<EntryRef> {
        self.l2.borrow().as_ref().and_then(|m| m.get(name).cloned())
    }

    /// 注册条目；被替换的旧条目失效
    pub fn add(
        &self,
        name: &Name,
        entry: &EntryRef,
    ) {
        let replaced = self
            .l2
            .borrow_mut()
            .get_or_insert_with(HashMap::new)
            .insert(name.clone(), entry.clone());
        if let Some(old) = replaced {
            if !Rc::ptr_eq(&old, entry) {
                old.invalidate();
            }
        }
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.l2.borrow().as_ref().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 取出全部 L2 条目
    pub(crate) fn take_entries(&self) -> Option<HashMap<Name, EntryRef>> {
        self.l2.borrow_mut().take()
    }

    /// 累加失效计数，超过阈值时停用
    pub(crate) fn bump_invalidate_count(&self) -> bool {
        let count = self.invalidate_count.get();
        self.invalidate_count.set(count.saturating_add(1));
        if count > CACHE_UPDATE_DISABLE_THRESHOLD && !self.disabled.get() {
            self.disabled.set(true);
            return true;
        }
        false
    }

    // =====================
    // 元类型依赖
    // =====================

    /// 记录依赖本元类型的类型属性条目
    pub(crate) fn add_type_inst(
        &self,
        ty: ObjectId,
        name: &Name,
        entry: &EntryRef,
    ) {
        self.type_insts
            .borrow_mut()
            .get_or_insert_with(HashMap::new)
            .entry(ty)
            .or_default()
            .insert(name.clone(), entry.clone());
    }

    /// 移除某个类型的依赖记录
    pub(crate) fn remove_type_inst(
        &self,
        ty: ObjectId,
    ) -> Option<HashMap<Name, EntryRef>> {
        self.type_insts.borrow_mut().as_mut().and_then(|m| m.remove(&ty))
    }

    /// 取出全部依赖记录
    pub(crate) fn take_type_insts(&self) -> Option<HashMap<ObjectId, HashMap<Name, EntryRef>>> {
        self.type_insts.borrow_mut().take()
    }

    pub fn has_type_inst(
        &self,
        ty: ObjectId,
    ) -> bool {
        self.type_insts
            .borrow()
            .as_ref()
            .is_some_and(|m| m.contains_key(&ty))
    }

    /// 依赖本元类型的类型数量
    pub fn type_inst_count(&self) -> usize {
        self.type_insts.borrow().as_ref().map_or(0, |m| m.len())
    }

    pub(crate) fn set_meta(
        &self,
        meta: &Rc<CacheRef>,
    ) {
        *self.meta.borrow_mut() = Some(Rc::downgrade(meta));
    }

    pub(crate) fn take_meta(&self) -> Option<Rc<CacheRef>> {
        self.meta.borrow_mut().take().and_then(|w| w.upgrade())
    }
}

impl Drop for CacheRef {
    fn drop(&mut self) {
        stats::registry_dropped();
    }
}

impl std::fmt::Debug for CacheRef {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CacheRef")
            .field("owner", &self.owner)
            .field("owner_name", &self.owner_name)
            .field("entries", &self.len())
            .field("invalidate_count", &self.invalidate_count.get())
            .field("disabled", &self.disabled.get())
            .finish()
    }
}

/// 拥有缓存注册表的对象
pub trait CacheOwner {
    fn owner_id(&self) -> ObjectId;

    fn owner_name(&self) -> &Name;

    fn cache_slot(&self) -> &RefCell<Option<Rc<CacheRef>>>;

    /// 现有注册表
    fn cache(&self) -> Option<Rc<CacheRef>> {
        self.cache_slot().borrow().clone()
    }

    /// 获取或创建注册表；已停用时返回 `None`
    fn get_or_create_cache(&self) -> Option<Rc<CacheRef>> {
        let mut slot = self.cache_slot().borrow_mut();
        let cache = slot
            .get_or_insert_with(|| CacheRef::new(self.owner_id(), self.owner_name()))
            .clone();
        (!cache.is_disabled()).then_some(cache)
    }
}

impl CacheOwner for TypeObject {
    fn owner_id(&self) -> ObjectId {
        self.id()
    }

    fn owner_name(&self) -> &Name {
        self.name()
    }

    fn cache_slot(&self) -> &RefCell<Option<Rc<CacheRef>>> {
        TypeObject::cache_slot(self)
    }
}

impl CacheOwner for Module {
    fn owner_id(&self) -> ObjectId {
        self.id()
    }

    fn owner_name(&self) -> &Name {
        self.name()
    }

    fn cache_slot(&self) -> &RefCell<Option<Rc<CacheRef>>> {
        Module::cache_slot(self)
    }
}
