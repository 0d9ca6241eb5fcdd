//! Modules

use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::object::dict::Namespace;
use crate::runtime::value::{Name, ObjectId, Value};
use crate::shadow::invalidate;
use crate::shadow::registry::CacheRef;

/// 模块：带版本号的命名空间
///
/// 模块命名空间同时是其中函数的全局命名空间。
#[derive(Debug)]
pub struct Module {
    id: ObjectId,
    name: Name,
    namespace: Namespace,
    cache: RefCell<Option<Rc<CacheRef>>>,
}

impl Module {
    pub fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            id: ObjectId::next(),
            name: Name::new(name),
            namespace: Namespace::new(),
            cache: RefCell::new(None),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// 命名空间当前版本
    pub fn version(&self) -> u64 {
        self.namespace.version()
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<Value> {
        self.namespace.get(name)
    }

    pub fn set(
        &self,
        name: &str,
        value: Value,
    ) {
        self.namespace.set(&Name::new(name), value);
    }

    pub fn remove(
        &self,
        name: &str,
    ) -> Option<Value> {
        self.namespace.remove(name)
    }

    pub(crate) fn cache_slot(&self) -> &RefCell<Option<Rc<CacheRef>>> {
        &self.cache
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.get_mut().take() {
            invalidate::owner_collected(&cache);
        }
        drop(self.namespace.clear());
    }
}
