//! Instance dictionaries and versioned namespaces
//!
//! 实例字典有两种布局：
//! - **Split**：键表由同一类型的实例共享，实例只保存值数组
//! - **Combined**：普通哈希表
//!
//! 共享键表的身份（`Rc` 指针）与指纹（键数量）是缓存判断布局是否变化的依据。

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};

use crate::runtime::value::{Name, Value};

/// 共享键表默认容量
pub const DEFAULT_SHARED_KEYS_CAPACITY: usize = 8;

/// 共享键表
pub struct SharedKeys {
    keys: RefCell<IndexSet<Name>>,
    capacity: usize,
}

impl SharedKeys {
    /// 创建空键表
    pub fn new(capacity: usize) -> Rc<Self> {
        Rc::new(Self {
            keys: RefCell::new(IndexSet::new()),
            capacity: capacity.max(1),
        })
    }

    fn with_keys(
        keys: IndexSet<Name>,
        capacity: usize,
    ) -> Rc<Self> {
        Rc::new(Self {
            keys: RefCell::new(keys),
            capacity,
        })
    }

    /// 键在表中的位置
    pub fn index_of(
        &self,
        name: &str,
    ) -> Option<usize> {
        self.keys.borrow().get_index_of(name)
    }

    /// 布局指纹：键表只会追加，因此键数量即可标识布局
    pub fn fingerprint(&self) -> usize {
        self.keys.borrow().len()
    }

    pub fn len(&self) -> usize {
        self.keys.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.borrow().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 追加新键，表满时返回 `None`
    fn push(
        &self,
        name: &Name,
    ) -> Option<usize> {
        let mut keys = self.keys.borrow_mut();
        if keys.len() >= self.capacity {
            return None;
        }
        let (index, _) = keys.insert_full(name.clone());
        Some(index)
    }

    fn key_at(
        &self,
        index: usize,
    ) -> Option<Name> {
        self.keys.borrow().get_index(index).cloned()
    }
}

impl std::fmt::Debug for SharedKeys {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SharedKeys")
            .field("keys", &*self.keys.borrow())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// 写入后类型缓存键表需要做的调整
#[derive(Debug)]
pub enum KeysUpdate {
    /// 无变化
    Unchanged,
    /// 键表已满，类型改用新的（更大的）共享键表
    Reshared(Rc<SharedKeys>),
    /// 类型不再共享键表
    Dropped,
}

/// 实例字典
#[derive(Debug)]
pub enum InstanceDict {
    Split {
        keys: Rc<SharedKeys>,
        values: Vec<Option<Value>>,
    },
    Combined(IndexMap<Name, Value>),
}

impl InstanceDict {
    /// 新字典：类型有共享键表时使用 split 布局
    pub fn for_type(cached_keys: Option<Rc<SharedKeys>>) -> Self {
        match cached_keys {
            Some(keys) => InstanceDict::Split {
                keys,
                values: Vec::new(),
            },
            None => InstanceDict::Combined(IndexMap::new()),
        }
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<Value> {
        match self {
            InstanceDict::Split { keys, values } => keys
                .index_of(name)
                .and_then(|i| values.get(i).cloned().flatten()),
            InstanceDict::Combined(map) => map.get(name).cloned(),
        }
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.get(name).is_some()
    }

    /// split 布局下的共享键表
    pub fn split_keys(&self) -> Option<&Rc<SharedKeys>> {
        match self {
            InstanceDict::Split { keys, .. } => Some(keys),
            InstanceDict::Combined(_) => None,
        }
    }

    /// 按位置读取 split 值
    pub fn split_value(
        &self,
        index: usize,
    ) -> Option<Value> {
        match self {
            InstanceDict::Split { values, .. } => values.get(index).cloned().flatten(),
            InstanceDict::Combined(_) => None,
        }
    }

    /// 按位置写入 split 值（键必须已在共享表中）
    pub fn set_split_value(
        &mut self,
        index: usize,
        value: Value,
    ) -> bool {
        match self {
            InstanceDict::Split { keys, values } if index < keys.len() => {
                if values.len() <= index {
                    values.resize(index + 1, None);
                }
                values[index] = Some(value);
                true
            }
            _ => false,
        }
    }

    /// 插入或覆盖
    ///
    /// `cached` 是类型当前的共享键表。split 表满时字典转为 combined；
    /// 若转换的正是类型的共享表，则以双倍容量重新共享。
    pub fn insert(
        &mut self,
        name: &Name,
        value: Value,
        cached: Option<&Rc<SharedKeys>>,
    ) -> KeysUpdate {
        let (keys, values) = match self {
            InstanceDict::Combined(map) => {
                map.insert(name.clone(), value);
                return KeysUpdate::Unchanged;
            }
            InstanceDict::Split { keys, values } => (keys, values),
        };

        let index = keys.index_of(name.as_str()).or_else(|| keys.push(name));
        if let Some(index) = index {
            if values.len() <= index {
                values.resize(index + 1, None);
            }
            values[index] = Some(value);
            return KeysUpdate::Unchanged;
        }

        let was_cached = cached.is_some_and(|c| Rc::ptr_eq(c, keys));
        let capacity = keys.capacity() * 2;
        self.make_combined();
        if let InstanceDict::Combined(map) = self {
            map.insert(name.clone(), value);
        }
        if !was_cached {
            return KeysUpdate::Unchanged;
        }

        let shared = match self {
            InstanceDict::Combined(map) => {
                let keys: IndexSet<Name> = map.keys().cloned().collect();
                let values = map.values().cloned().map(Some).collect();
                let shared = SharedKeys::with_keys(keys, capacity.max(map.len()));
                *self = InstanceDict::Split {
                    keys: shared.clone(),
                    values,
                };
                shared
            }
            InstanceDict::Split { keys, .. } => keys.clone(),
        };
        KeysUpdate::Reshared(shared)
    }

    /// 删除键；split 布局转为 combined，类型停止共享键表
    pub fn remove(
        &mut self,
        name: &str,
    ) -> (Option<Value>, KeysUpdate) {
        let update = match self {
            InstanceDict::Split { .. } => {
                self.make_combined();
                KeysUpdate::Dropped
            }
            InstanceDict::Combined(_) => KeysUpdate::Unchanged,
        };
        let removed = match self {
            InstanceDict::Combined(map) => map.shift_remove(name),
            InstanceDict::Split { .. } => None,
        };
        (removed, update)
    }

    /// 字典中的键（按插入顺序）
    pub fn keys(&self) -> Vec<Name> {
        match self {
            InstanceDict::Split { keys, values } => values
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_some())
                .filter_map(|(i, _)| keys.key_at(i))
                .collect(),
            InstanceDict::Combined(map) => map.keys().cloned().collect(),
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self, InstanceDict::Split { .. })
    }

    fn make_combined(&mut self) {
        if let InstanceDict::Split { keys, values } = self {
            let mut map = IndexMap::with_capacity(values.len());
            for (i, value) in values.iter().enumerate() {
                if let (Some(value), Some(key)) = (value, keys.key_at(i)) {
                    map.insert(key, value.clone());
                }
            }
            *self = InstanceDict::Combined(map);
        }
    }
}

// =====================
// 带版本的命名空间
// =====================

static NAMESPACE_VERSION: AtomicU64 = AtomicU64::new(1);

/// 分配新的命名空间版本（进程内单调递增）
pub fn next_version() -> u64 {
    NAMESPACE_VERSION.fetch_add(1, Ordering::Relaxed)
}

/// 模块命名空间 / 内置命名空间
///
/// 每次修改都从全局计数器取新版本，因此
/// `max(globals.version, builtins.version)` 可作为组合版本戳。
#[derive(Debug)]
pub struct Namespace {
    map: RefCell<IndexMap<Name, Value>>,
    version: Cell<u64>,
}

impl Namespace {
    pub fn new() -> Self {
        Self {
            map: RefCell::new(IndexMap::new()),
            version: Cell::new(next_version()),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.get()
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<Value> {
        self.map.borrow().get(name).cloned()
    }

    pub fn set(
        &self,
        name: &Name,
        value: Value,
    ) {
        let previous = self.map.borrow_mut().insert(name.clone(), value);
        self.version.set(next_version());
        drop(previous);
    }

    pub fn remove(
        &self,
        name: &str,
    ) -> Option<Value> {
        let removed = self.map.borrow_mut().shift_remove(name);
        if removed.is_some() {
            self.version.set(next_version());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.borrow().is_empty()
    }

    /// 清空（模块销毁时调用）
    pub fn clear(&self) -> Vec<Value> {
        let drained = self.map.borrow_mut().drain(..).map(|(_, v)| v).collect();
        self.version.set(next_version());
        drained
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}
