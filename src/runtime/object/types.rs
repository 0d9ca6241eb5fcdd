//! Type objects
//!
//! 类型对象持有属性字典、MRO、实例布局（固定槽位 / 实例字典 / 共享键表）
//! 以及自己的缓存注册表（L2）。任何属性修改都会通知缓存层。

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::runtime::errors::{RuntimeError, RuntimeResult};
use crate::runtime::object::dict::{SharedKeys, DEFAULT_SHARED_KEYS_CAPACITY};
use crate::runtime::object::Instance;
use crate::runtime::value::{
    Function, GetAttrHook, MemberDescr, Name, ObjectId, SetAttrHook, Value,
};
use crate::shadow::invalidate;
use crate::shadow::registry::CacheRef;

/// 类型对象
pub struct TypeObject {
    id: ObjectId,
    name: Name,
    metatype: Option<Rc<TypeObject>>,
    bases: Vec<Rc<TypeObject>>,
    /// C3 线性化结果（不含自身）
    ancestors: Vec<Rc<TypeObject>>,
    dict: RefCell<IndexMap<Name, Value>>,
    subclasses: RefCell<Vec<Weak<TypeObject>>>,
    nslots: usize,
    has_dict: bool,
    keys_capacity: usize,
    cached_keys: RefCell<Option<Rc<SharedKeys>>>,
    getattr_hook: Option<GetAttrHook>,
    setattr_hook: Option<SetAttrHook>,
    cache: RefCell<Option<Rc<CacheRef>>>,
}

impl TypeObject {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    /// 元类型（`None` 表示默认的 `type`）
    pub fn metatype(&self) -> Option<&Rc<TypeObject>> {
        self.metatype.as_ref()
    }

    pub fn bases(&self) -> &[Rc<TypeObject>] {
        &self.bases
    }

    /// 完整 MRO（含自身）
    pub fn mro(self: &Rc<Self>) -> Vec<Rc<TypeObject>> {
        let mut mro = Vec::with_capacity(self.ancestors.len() + 1);
        mro.push(self.clone());
        mro.extend(self.ancestors.iter().cloned());
        mro
    }

    /// 沿 MRO 查找属性
    pub fn lookup(
        &self,
        name: &str,
    ) -> Option<Value> {
        if let Some(value) = self.dict.borrow().get(name) {
            return Some(value.clone());
        }
        self.ancestors
            .iter()
            .find_map(|ty| ty.dict.borrow().get(name).cloned())
    }

    /// 类型自身字典中的属性
    pub fn own_attr(
        &self,
        name: &str,
    ) -> Option<Value> {
        self.dict.borrow().get(name).cloned()
    }

    /// 设置类型属性，使缓存失效
    pub fn set_attr(
        &self,
        name: &Name,
        value: Value,
    ) {
        let previous = self.dict.borrow_mut().insert(name.clone(), value);
        invalidate::type_modified(self);
        drop(previous);
    }

    /// 删除类型属性，使缓存失效
    pub fn del_attr(
        &self,
        name: &Name,
    ) -> RuntimeResult<()> {
        let removed = self.dict.borrow_mut().shift_remove(name);
        match removed {
            Some(value) => {
                invalidate::type_modified(self);
                drop(value);
                Ok(())
            }
            None => Err(RuntimeError::no_type_attribute(
                self.name.as_str(),
                name.as_str(),
            )),
        }
    }

    /// 仍然存活的直接子类
    pub fn subclasses(&self) -> Vec<Rc<TypeObject>> {
        let mut subclasses = self.subclasses.borrow_mut();
        subclasses.retain(|w| w.strong_count() > 0);
        subclasses.iter().filter_map(Weak::upgrade).collect()
    }

    /// 实例固定槽位数量
    pub fn nslots(&self) -> usize {
        self.nslots
    }

    /// 实例是否带字典
    pub fn has_dict(&self) -> bool {
        self.has_dict
    }

    /// 当前共享键表
    pub fn cached_keys(&self) -> Option<Rc<SharedKeys>> {
        self.cached_keys.borrow().clone()
    }

    pub(crate) fn set_cached_keys(
        &self,
        keys: Option<Rc<SharedKeys>>,
    ) {
        *self.cached_keys.borrow_mut() = keys;
    }

    pub fn keys_capacity(&self) -> usize {
        self.keys_capacity
    }

    /// 使用默认属性读取协议
    pub fn has_default_getattr(&self) -> bool {
        self.getattr_hook.is_none()
    }

    /// 使用默认属性写入协议
    pub fn has_default_setattr(&self) -> bool {
        self.setattr_hook.is_none()
    }

    pub fn getattr_hook(&self) -> Option<&GetAttrHook> {
        self.getattr_hook.as_ref()
    }

    pub fn setattr_hook(&self) -> Option<&SetAttrHook> {
        self.setattr_hook.as_ref()
    }

    /// `self` 是否是 `other` 的子类型（含相等）
    pub fn is_subtype(
        &self,
        other: &TypeObject,
    ) -> bool {
        self.id == other.id || self.ancestors.iter().any(|t| t.id == other.id)
    }

    /// 创建实例
    pub fn instantiate(self: &Rc<Self>) -> Rc<Instance> {
        Instance::new(self.clone())
    }

    /// 缓存注册表槽位
    pub(crate) fn cache_slot(&self) -> &RefCell<Option<Rc<CacheRef>>> {
        &self.cache
    }
}

impl Drop for TypeObject {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.get_mut().take() {
            invalidate::owner_collected(&cache);
        }
    }
}

impl std::fmt::Debug for TypeObject {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TypeObject")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("nslots", &self.nslots)
            .field("has_dict", &self.has_dict)
            .finish()
    }
}

/// 类型构建器
pub struct TypeBuilder {
    name: Name,
    bases: Vec<Rc<TypeObject>>,
    metatype: Option<Rc<TypeObject>>,
    slots: Vec<(Name, bool)>,
    attrs: Vec<(Name, Value)>,
    no_dict: bool,
    split_dict: bool,
    keys_capacity: usize,
    getattr_hook: Option<GetAttrHook>,
    setattr_hook: Option<SetAttrHook>,
}

impl TypeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: Name::new(name),
            bases: Vec::new(),
            metatype: None,
            slots: Vec::new(),
            attrs: Vec::new(),
            no_dict: false,
            split_dict: true,
            keys_capacity: DEFAULT_SHARED_KEYS_CAPACITY,
            getattr_hook: None,
            setattr_hook: None,
        }
    }

    pub fn base(
        mut self,
        base: &Rc<TypeObject>,
    ) -> Self {
        self.bases.push(base.clone());
        self
    }

    pub fn metatype(
        mut self,
        meta: &Rc<TypeObject>,
    ) -> Self {
        self.metatype = Some(meta.clone());
        self
    }

    /// 可写固定槽位
    pub fn slot(
        mut self,
        name: &str,
    ) -> Self {
        self.slots.push((Name::new(name), false));
        self
    }

    /// 只读固定槽位
    pub fn readonly_slot(
        mut self,
        name: &str,
    ) -> Self {
        self.slots.push((Name::new(name), true));
        self
    }

    /// 实例不带字典（除非基类带字典）
    pub fn no_dict(mut self) -> Self {
        self.no_dict = true;
        self
    }

    /// 实例字典不共享键表
    pub fn combined_dict(mut self) -> Self {
        self.split_dict = false;
        self
    }

    pub fn keys_capacity(
        mut self,
        capacity: usize,
    ) -> Self {
        self.keys_capacity = capacity.max(1);
        self
    }

    pub fn attr(
        mut self,
        name: &str,
        value: Value,
    ) -> Self {
        self.attrs.push((Name::new(name), value));
        self
    }

    pub fn method(
        self,
        name: &str,
        func: impl Fn(&[Value]) -> RuntimeResult<Value> + 'static,
    ) -> Self {
        let func = Function::new(name, func);
        self.attr(name, Value::Function(func))
    }

    pub fn getattr_hook(
        mut self,
        hook: impl Fn(&Value, &Name) -> RuntimeResult<Value> + 'static,
    ) -> Self {
        self.getattr_hook = Some(Rc::new(hook));
        self
    }

    pub fn setattr_hook(
        mut self,
        hook: impl Fn(&Value, &Name, Value) -> RuntimeResult<()> + 'static,
    ) -> Self {
        self.setattr_hook = Some(Rc::new(hook));
        self
    }

    pub fn build(self) -> RuntimeResult<Rc<TypeObject>> {
        let ancestors = linearize(&self.bases)?;

        let base_slots = self.bases.iter().map(|b| b.nslots).max().unwrap_or(0);
        let has_dict = !self.no_dict || self.bases.iter().any(|b| b.has_dict);

        let mut dict = IndexMap::new();
        for (offset, (name, readonly)) in self.slots.iter().enumerate() {
            let member = MemberDescr {
                name: name.clone(),
                offset: base_slots + offset,
                readonly: *readonly,
            };
            dict.insert(name.clone(), Value::Member(Rc::new(member)));
        }
        for (name, value) in self.attrs {
            dict.insert(name, value);
        }

        let getattr_hook = self
            .getattr_hook
            .or_else(|| ancestors.iter().find_map(|t| t.getattr_hook.clone()));
        let setattr_hook = self
            .setattr_hook
            .or_else(|| ancestors.iter().find_map(|t| t.setattr_hook.clone()));

        let cached_keys = (has_dict && self.split_dict).then(|| SharedKeys::new(self.keys_capacity));

        let ty = Rc::new(TypeObject {
            id: ObjectId::next(),
            name: self.name,
            metatype: self.metatype,
            bases: self.bases,
            ancestors,
            dict: RefCell::new(dict),
            subclasses: RefCell::new(Vec::new()),
            nslots: base_slots + self.slots.len(),
            has_dict,
            keys_capacity: self.keys_capacity,
            cached_keys: RefCell::new(cached_keys),
            getattr_hook,
            setattr_hook,
            cache: RefCell::new(None),
        });
        for base in &ty.bases {
            base.subclasses.borrow_mut().push(Rc::downgrade(&ty));
        }
        tracing::trace!("type '{}' created ({:?})", ty.name, ty.id);
        Ok(ty)
    }
}

/// C3 线性化
fn linearize(bases: &[Rc<TypeObject>]) -> RuntimeResult<Vec<Rc<TypeObject>>> {
    let mut seqs: Vec<Vec<Rc<TypeObject>>> = bases.iter().map(|b| b.mro()).collect();
    seqs.push(bases.to_vec());

    let mut result: Vec<Rc<TypeObject>> = Vec::new();
    loop {
        seqs.retain(|s| !s.is_empty());
        if seqs.is_empty() {
            return Ok(result);
        }
        let candidate = seqs
            .iter()
            .map(|s| s[0].clone())
            .find(|c| !seqs.iter().any(|s| s[1..].iter().any(|t| Rc::ptr_eq(t, c))));
        let Some(next) = candidate else {
            return Err(RuntimeError::TypeError(
                "Cannot create a consistent method resolution order (MRO)".to_string(),
            ));
        };
        for seq in seqs.iter_mut() {
            if Rc::ptr_eq(&seq[0], &next) {
                seq.remove(0);
            }
        }
        result.push(next);
    }
}
