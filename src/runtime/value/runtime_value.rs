//! Runtime value representation
//!
//! `Value` 是解释器中所有值的统一表示。对象图是单线程的：
//! 共享所有权使用 `Rc`，可变状态使用 `Cell`/`RefCell`，
//! 由宿主运行时的全局执行权保证串行访问。

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::runtime::errors::{RuntimeError, RuntimeResult};
use crate::runtime::object::{Instance, Module, TypeObject};

// =====================
// 驻留名称
// =====================

thread_local! {
    static INTERNED: RefCell<HashSet<Rc<str>>> = RefCell::new(HashSet::new());
}

/// 驻留字符串（属性名、全局名）
///
/// 相同内容的名称共享同一份存储，比较时先比较指针。
#[derive(Clone)]
pub struct Name(Rc<str>);

impl Name {
    /// 驻留并返回名称
    pub fn new(s: &str) -> Self {
        INTERNED.with(|set| {
            let mut set = set.borrow_mut();
            if let Some(existing) = set.get(s) {
                return Name(existing.clone());
            }
            let interned: Rc<str> = Rc::from(s);
            set.insert(interned.clone());
            Name(interned)
        })
    }

    /// 名称内容
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Name {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        (*self.0).hash(state)
    }
}

impl std::borrow::Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::new(s)
    }
}

impl fmt::Debug for Name {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =====================
// 对象标识
// =====================

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// 类型/模块的进程内唯一标识
///
/// 从不复用，因此缓存条目可以用它作为非拥有的所有者引用。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// 分配新的标识
    pub fn next() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// =====================
// 可调用对象与描述符
// =====================

/// 原生函数体
pub type NativeFn = Rc<dyn Fn(&[Value]) -> RuntimeResult<Value>>;
/// 属性读取器
pub type Getter = Rc<dyn Fn(&Value) -> RuntimeResult<Value>>;
/// 属性写入器
pub type Setter = Rc<dyn Fn(&Value, Value) -> RuntimeResult<()>>;
/// 自定义属性读取协议（替代默认协议）
pub type GetAttrHook = Rc<dyn Fn(&Value, &Name) -> RuntimeResult<Value>>;
/// 自定义属性写入协议（替代默认协议）
pub type SetAttrHook = Rc<dyn Fn(&Value, &Name, Value) -> RuntimeResult<()>>;

/// 函数（作为类型属性时是非数据描述符，即"方法"）
pub struct Function {
    /// 函数名
    pub name: Name,
    func: NativeFn,
}

impl Function {
    /// 创建函数
    pub fn new(
        name: &str,
        func: impl Fn(&[Value]) -> RuntimeResult<Value> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: Name::new(name),
            func: Rc::new(func),
        })
    }

    /// 调用函数
    pub fn call(
        &self,
        args: &[Value],
    ) -> RuntimeResult<Value> {
        (self.func)(args)
    }
}

/// 绑定方法
pub struct BoundMethod {
    /// 接收者
    pub receiver: Value,
    /// 底层函数
    pub func: Rc<Function>,
}

/// 成员描述符：实例固定槽位（数据描述符）
#[derive(Debug)]
pub struct MemberDescr {
    /// 成员名
    pub name: Name,
    /// 槽位偏移
    pub offset: usize,
    /// 只读
    pub readonly: bool,
}

/// 属性描述符（数据描述符，由读取器/写入器实现）
pub struct Property {
    /// 属性名
    pub name: Name,
    /// 读取器
    pub getter: Option<Getter>,
    /// 写入器
    pub setter: Option<Setter>,
}

impl Property {
    /// 只读属性
    pub fn readonly(
        name: &str,
        getter: impl Fn(&Value) -> RuntimeResult<Value> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: Name::new(name),
            getter: Some(Rc::new(getter)),
            setter: None,
        })
    }

    /// 可读写属性
    pub fn read_write(
        name: &str,
        getter: impl Fn(&Value) -> RuntimeResult<Value> + 'static,
        setter: impl Fn(&Value, Value) -> RuntimeResult<()> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: Name::new(name),
            getter: Some(Rc::new(getter)),
            setter: Some(Rc::new(setter)),
        })
    }
}

// =====================
// 字典键
// =====================

/// 可哈希的字典键
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DictKey {
    None,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
}

impl DictKey {
    /// 转换回值
    pub fn to_value(&self) -> Value {
        match self {
            DictKey::None => Value::None,
            DictKey::Bool(b) => Value::Bool(*b),
            DictKey::Int(i) => Value::Int(*i),
            DictKey::Str(s) => Value::Str(s.clone()),
        }
    }
}

/// 字典存储
pub type DictStorage = IndexMap<DictKey, Value>;

// =====================
// 值
// =====================

/// 运行时值
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Tuple(Rc<[Value]>),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<DictStorage>>),
    Function(Rc<Function>),
    BoundMethod(Rc<BoundMethod>),
    Member(Rc<MemberDescr>),
    Property(Rc<Property>),
    Instance(Rc<Instance>),
    Type(Rc<TypeObject>),
    Module(Rc<Module>),
}

impl Value {
    /// 字符串值
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    /// 元组值
    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::from(items))
    }

    /// 列表值
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// 字典值
    pub fn dict(pairs: Vec<(Value, Value)>) -> RuntimeResult<Self> {
        let mut storage = DictStorage::new();
        for (k, v) in pairs {
            storage.insert(k.to_key()?, v);
        }
        Ok(Value::Dict(Rc::new(RefCell::new(storage))))
    }

    /// 转换为字典键
    pub fn to_key(&self) -> RuntimeResult<DictKey> {
        match self {
            Value::None => Ok(DictKey::None),
            Value::Bool(b) => Ok(DictKey::Bool(*b)),
            Value::Int(i) => Ok(DictKey::Int(*i)),
            Value::Str(s) => Ok(DictKey::Str(s.clone())),
            other => Err(RuntimeError::TypeError(format!(
                "unhashable type: '{}'",
                other.type_name()
            ))),
        }
    }

    /// 值的类型名
    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::Tuple(_) => "tuple".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::Function(_) => "function".to_string(),
            Value::BoundMethod(_) => "method".to_string(),
            Value::Member(_) => "member_descriptor".to_string(),
            Value::Property(_) => "property".to_string(),
            Value::Instance(inst) => inst.type_object().name().to_string(),
            Value::Type(ty) => ty
                .metatype()
                .map(|m| m.name().to_string())
                .unwrap_or_else(|| "type".to_string()),
            Value::Module(_) => "module".to_string(),
        }
    }

    /// 数据描述符（优先于实例字典）
    pub fn is_data_descriptor(&self) -> bool {
        matches!(self, Value::Member(_) | Value::Property(_))
    }

    /// 方法（可以不绑定直接调用）
    pub fn is_method(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// 获取整数
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// 获取实例
    pub fn as_instance(&self) -> Option<&Rc<Instance>> {
        match self {
            Value::Instance(inst) => Some(inst),
            _ => None,
        }
    }

    /// 获取类型对象
    pub fn as_type(&self) -> Option<&Rc<TypeObject>> {
        match self {
            Value::Type(ty) => Some(ty),
            _ => None,
        }
    }

    /// 获取字符串
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::BoundMethod(a), Value::BoundMethod(b)) => {
                Rc::ptr_eq(&a.func, &b.func) && a.receiver == b.receiver
            }
            (Value::Member(a), Value::Member(b)) => Rc::ptr_eq(a, b),
            (Value::Property(a), Value::Property(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Tuple(items) => f.debug_tuple("").field(items).finish(),
            Value::List(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Dict(map) => f
                .debug_map()
                .entries(map.borrow().iter().map(|(k, v)| (k.to_value(), v.clone())))
                .finish(),
            Value::Function(func) => write!(f, "<function {}>", func.name),
            Value::BoundMethod(m) => write!(f, "<bound method {}>", m.func.name),
            Value::Member(m) => write!(f, "<member '{}'>", m.name),
            Value::Property(p) => write!(f, "<property '{}'>", p.name),
            Value::Instance(inst) => write!(f, "<{} object>", inst.type_object().name()),
            Value::Type(ty) => write!(f, "<class '{}'>", ty.name()),
            Value::Module(m) => write!(f, "<module '{}'>", m.name()),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

/// `LOAD_METHOD` 的结果
///
/// - `Unbound`：找到方法描述符，接收者单独传递，避免创建绑定方法
/// - `Bound`：普通属性值，直接调用
#[derive(Debug, Clone, PartialEq)]
pub enum MethodRef {
    Unbound { func: Value, receiver: Value },
    Bound(Value),
}

impl MethodRef {
    /// 是否未绑定
    pub fn is_unbound(&self) -> bool {
        matches!(self, MethodRef::Unbound { .. })
    }
}
