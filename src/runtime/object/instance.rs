//! Instances

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use crate::runtime::errors::{RuntimeError, RuntimeResult};
use crate::runtime::object::dict::{InstanceDict, KeysUpdate, SharedKeys};
use crate::runtime::object::TypeObject;
use crate::runtime::value::{Name, Value};

/// 用户类型的实例
#[derive(Debug)]
pub struct Instance {
    ty: Rc<TypeObject>,
    slots: RefCell<Vec<Option<Value>>>,
    dict: RefCell<Option<InstanceDict>>,
}

impl Instance {
    pub(crate) fn new(ty: Rc<TypeObject>) -> Rc<Self> {
        let dict = ty
            .has_dict()
            .then(|| InstanceDict::for_type(ty.cached_keys()));
        Rc::new(Self {
            slots: RefCell::new(vec![None; ty.nslots()]),
            dict: RefCell::new(dict),
            ty,
        })
    }

    pub fn type_object(&self) -> &Rc<TypeObject> {
        &self.ty
    }

    // =====================
    // 固定槽位
    // =====================

    pub fn slot_get(
        &self,
        offset: usize,
    ) -> Option<Value> {
        self.slots.borrow().get(offset).cloned().flatten()
    }

    pub fn slot_set(
        &self,
        offset: usize,
        value: Option<Value>,
    ) {
        let previous = match self.slots.borrow_mut().get_mut(offset) {
            Some(slot) => std::mem::replace(slot, value),
            None => None,
        };
        drop(previous);
    }

    // =====================
    // 实例字典
    // =====================

    pub fn has_dict(&self) -> bool {
        self.dict.borrow().is_some()
    }

    /// 借用实例字典
    pub fn dict(&self) -> Ref<'_, Option<InstanceDict>> {
        self.dict.borrow()
    }

    pub fn dict_get(
        &self,
        name: &str,
    ) -> Option<Value> {
        self.dict.borrow().as_ref().and_then(|d| d.get(name))
    }

    /// split 字典按位置写入；键表不匹配时返回 `false`
    pub fn set_split_value(
        &self,
        keys: &Rc<SharedKeys>,
        index: usize,
        value: Value,
    ) -> bool {
        let mut dict = self.dict.borrow_mut();
        match dict.as_mut() {
            Some(d) if d.split_keys().is_some_and(|k| Rc::ptr_eq(k, keys)) => {
                d.set_split_value(index, value)
            }
            _ => false,
        }
    }

    /// 写入实例字典，并维护类型的共享键表
    pub fn set_dict_item(
        &self,
        name: &Name,
        value: Value,
    ) -> RuntimeResult<()> {
        let update = {
            let mut dict = self.dict.borrow_mut();
            let Some(dict) = dict.as_mut() else {
                return Err(RuntimeError::no_attribute(
                    self.ty.name().as_str(),
                    name.as_str(),
                ));
            };
            let cached = self.ty.cached_keys();
            dict.insert(name, value, cached.as_ref())
        };
        self.apply_keys_update(update);
        Ok(())
    }

    /// 从实例字典删除
    pub fn del_dict_item(
        &self,
        name: &Name,
    ) -> RuntimeResult<()> {
        let (removed, update) = {
            let mut dict = self.dict.borrow_mut();
            match dict.as_mut() {
                Some(dict) => dict.remove(name.as_str()),
                None => (None, KeysUpdate::Unchanged),
            }
        };
        self.apply_keys_update(update);
        match removed {
            Some(_) => Ok(()),
            None => Err(RuntimeError::no_attribute(
                self.ty.name().as_str(),
                name.as_str(),
            )),
        }
    }

    fn apply_keys_update(
        &self,
        update: KeysUpdate,
    ) {
        match update {
            KeysUpdate::Unchanged => {}
            KeysUpdate::Reshared(keys) => {
                tracing::trace!(
                    "type '{}' reshared instance keys (capacity {})",
                    self.ty.name(),
                    keys.capacity()
                );
                self.ty.set_cached_keys(Some(keys));
            }
            KeysUpdate::Dropped => self.ty.set_cached_keys(None),
        }
    }
}
