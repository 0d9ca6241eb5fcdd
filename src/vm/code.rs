//! Code objects
//!
//! 代码对象持有规范（不可变）指令流、常量、名称以及可选的影子字节码。
//! 规范指令流永不修改；特化只发生在影子副本上。

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexSet;

use crate::runtime::object::Module;
use crate::runtime::value::{Name, Value};
use crate::shadow::entry::EntryRef;
use crate::shadow::ShadowCode;
use crate::vm::instructions::{encode, read_arg, CodeUnit};
use crate::vm::opcode::Opcode;

/// 代码对象
pub struct CodeObject {
    name: Name,
    code: Rc<[CodeUnit]>,
    consts: Vec<Value>,
    names: Vec<Name>,
    nlocals: usize,
    module: Rc<Module>,
    calls: Cell<u64>,
    pub(crate) shadow: RefCell<Option<ShadowCode>>,
}

impl CodeObject {
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// 规范指令流
    pub fn code(&self) -> &[CodeUnit] {
        &self.code
    }

    pub fn consts(&self) -> &[Value] {
        &self.consts
    }

    pub fn names(&self) -> &[Name] {
        &self.names
    }

    pub fn nlocals(&self) -> usize {
        self.nlocals
    }

    /// 全局命名空间所在模块
    pub fn module(&self) -> &Rc<Module> {
        &self.module
    }

    /// 记录一次调用，返回累计调用次数
    pub fn note_call(&self) -> u64 {
        let calls = self.calls.get() + 1;
        self.calls.set(calls);
        calls
    }

    /// 读取单元：有影子字节码时读取影子副本
    pub fn unit_at(
        &self,
        at: usize,
    ) -> Option<CodeUnit> {
        if let Some(shadow) = self.shadow.borrow().as_ref() {
            return shadow.code.get(at).copied();
        }
        self.code.get(at).copied()
    }

    /// 规范指令流中结束于 `at` 的指令的操作码
    pub fn original_op(
        &self,
        at: usize,
    ) -> Option<Opcode> {
        self.code.get(at).and_then(|u| u.opcode())
    }

    /// 规范指令流中结束于 `at` 的指令的操作数
    pub fn original_arg(
        &self,
        at: usize,
    ) -> u32 {
        read_arg(&self.code, at)
    }

    /// 规范指令流中结束于 `at` 的指令引用的名称
    pub fn original_name(
        &self,
        at: usize,
    ) -> Option<Name> {
        self.names.get(self.original_arg(at) as usize).cloned()
    }

    // =====================
    // 影子字节码查询
    // =====================

    pub fn has_shadow(&self) -> bool {
        self.shadow.borrow().is_some()
    }

    /// 影子指令流的副本
    pub fn shadow_code(&self) -> Option<Vec<CodeUnit>> {
        self.shadow.borrow().as_ref().map(|s| s.code.clone())
    }

    /// 当前（影子）指令流中结束于 `at` 的指令
    pub fn current_instr(
        &self,
        at: usize,
    ) -> Option<(Opcode, u32)> {
        let shadow = self.shadow.borrow();
        let units: &[CodeUnit] = match shadow.as_ref() {
            Some(s) => &s.code,
            None => &self.code,
        };
        let op = units.get(at)?.opcode()?;
        Some((op, read_arg(units, at)))
    }

    /// L1 槽位中的缓存条目
    pub fn l1_entry(
        &self,
        index: u32,
    ) -> Option<EntryRef> {
        self.shadow
            .borrow()
            .as_ref()
            .and_then(|s| s.l1.get(index as usize).cloned())
    }

    /// L1 中仍被引用的槽位数
    pub fn l1_live(&self) -> usize {
        self.shadow.borrow().as_ref().map_or(0, |s| s.l1.live())
    }

    /// 影子字节码的失效计数
    pub fn update_count(&self) -> u32 {
        self.shadow.borrow().as_ref().map_or(0, |s| s.update_count)
    }
}

impl std::fmt::Debug for CodeObject {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CodeObject")
            .field("name", &self.name)
            .field("units", &self.code.len())
            .field("shadowed", &self.has_shadow())
            .finish()
    }
}

/// 代码对象汇编器
pub struct CodeBuilder {
    name: Name,
    module: Rc<Module>,
    units: Vec<CodeUnit>,
    consts: Vec<Value>,
    names: IndexSet<Name>,
    nlocals: usize,
}

impl CodeBuilder {
    pub fn new(
        name: &str,
        module: &Rc<Module>,
    ) -> Self {
        Self {
            name: Name::new(name),
            module: module.clone(),
            units: Vec::new(),
            consts: Vec::new(),
            names: IndexSet::new(),
            nlocals: 0,
        }
    }

    /// 局部变量数量
    pub fn locals(
        mut self,
        nlocals: usize,
    ) -> Self {
        self.nlocals = nlocals;
        self
    }

    /// 发射指令（必要时带 `ExtendedArg` 前缀）
    pub fn emit(
        mut self,
        op: Opcode,
        arg: u32,
    ) -> Self {
        self.units.extend(encode(op, arg));
        self
    }

    /// 添加常量，返回索引
    pub fn add_const(
        &mut self,
        value: Value,
    ) -> u32 {
        if let Some(i) = self.consts.iter().position(|c| *c == value) {
            return i as u32;
        }
        self.consts.push(value);
        (self.consts.len() - 1) as u32
    }

    /// 添加名称，返回索引
    pub fn add_name(
        &mut self,
        name: &str,
    ) -> u32 {
        let (index, _) = self.names.insert_full(Name::new(name));
        index as u32
    }

    pub fn load_const(
        mut self,
        value: Value,
    ) -> Self {
        let index = self.add_const(value);
        self.emit(Opcode::LoadConst, index)
    }

    pub fn load_fast(
        self,
        index: u32,
    ) -> Self {
        self.emit(Opcode::LoadFast, index)
    }

    pub fn store_fast(
        self,
        index: u32,
    ) -> Self {
        self.emit(Opcode::StoreFast, index)
    }

    pub fn load_attr(
        mut self,
        name: &str,
    ) -> Self {
        let index = self.add_name(name);
        self.emit(Opcode::LoadAttr, index)
    }

    pub fn load_method(
        mut self,
        name: &str,
    ) -> Self {
        let index = self.add_name(name);
        self.emit(Opcode::LoadMethod, index)
    }

    pub fn store_attr(
        mut self,
        name: &str,
    ) -> Self {
        let index = self.add_name(name);
        self.emit(Opcode::StoreAttr, index)
    }

    pub fn load_global(
        mut self,
        name: &str,
    ) -> Self {
        let index = self.add_name(name);
        self.emit(Opcode::LoadGlobal, index)
    }

    pub fn call_function(
        self,
        argc: u32,
    ) -> Self {
        self.emit(Opcode::CallFunction, argc)
    }

    pub fn call_method(
        self,
        argc: u32,
    ) -> Self {
        self.emit(Opcode::CallMethod, argc)
    }

    pub fn binary_subscr(self) -> Self {
        self.emit(Opcode::BinarySubscr, 0)
    }

    pub fn binary_add(self) -> Self {
        self.emit(Opcode::BinaryAdd, 0)
    }

    pub fn build_tuple(
        self,
        count: u32,
    ) -> Self {
        self.emit(Opcode::BuildTuple, count)
    }

    pub fn build_list(
        self,
        count: u32,
    ) -> Self {
        self.emit(Opcode::BuildList, count)
    }

    pub fn pop_top(self) -> Self {
        self.emit(Opcode::PopTop, 0)
    }

    pub fn dup_top(self) -> Self {
        self.emit(Opcode::DupTop, 0)
    }

    pub fn return_value(self) -> Self {
        self.emit(Opcode::ReturnValue, 0)
    }

    pub fn build(self) -> CodeObject {
        CodeObject {
            name: self.name,
            code: Rc::from(self.units),
            consts: self.consts,
            names: self.names.into_iter().collect(),
            nlocals: self.nlocals,
            module: self.module,
            calls: Cell::new(0),
            shadow: RefCell::new(None),
        }
    }
}
