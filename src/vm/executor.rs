//! Virtual Machine executor
//!
//! 栈式字节码解释器。函数被调用超过预热次数后获得影子字节码，
//! 之后可特化指令交给 [`crate::shadow`] 的处理函数执行；
//! 没有影子字节码时全部走通用路径。

use std::rc::Rc;

use tracing::{debug, trace};

use crate::runtime::errors::{RuntimeError, RuntimeResult};
use crate::runtime::object::{generic, Namespace};
use crate::runtime::value::{Name, Value};
use crate::shadow::subscr::ConstIntOutcome;
use crate::shadow::{self, attr, global, polymorphic, subscr, ShadowContext};
use crate::util::config::ShadowConfig;
use crate::vm::code::CodeObject;
use crate::vm::errors::{VMError, VMResult};
use crate::vm::frames::Frame;
use crate::vm::opcode::Opcode;

/// VM 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VMStatus {
    /// 就绪
    Ready,
    /// 运行中
    Running,
    /// 已完成
    Finished,
    /// 出错
    Error,
}

/// 虚拟机
#[derive(Debug)]
pub struct VM {
    /// 配置
    config: ShadowConfig,
    /// 状态
    status: VMStatus,
    /// 错误
    error: Option<String>,
    /// 内置命名空间
    builtins: Rc<Namespace>,
}

impl Default for VM {
    fn default() -> Self {
        Self::new_with_config(ShadowConfig::default())
    }
}

impl VM {
    /// 使用默认配置创建 VM
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用配置创建 VM
    pub fn new_with_config(config: ShadowConfig) -> Self {
        Self {
            config,
            status: VMStatus::Ready,
            error: None,
            builtins: Rc::new(Namespace::new()),
        }
    }

    /// 共享内置命名空间
    pub fn with_builtins(
        mut self,
        builtins: Rc<Namespace>,
    ) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// 获取 VM 状态
    pub fn status(&self) -> VMStatus {
        self.status
    }

    /// 最近一次失败的错误信息
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// 内置命名空间
    pub fn builtins(&self) -> &Rc<Namespace> {
        &self.builtins
    }

    /// 执行函数
    pub fn run(
        &mut self,
        code: &CodeObject,
        args: &[Value],
    ) -> VMResult<Value> {
        let calls = code.note_call();
        if self.config.enabled && calls > self.config.warmup_calls && !code.has_shadow() {
            shadow::init_cache(code, &self.config);
        }

        self.status = VMStatus::Running;
        let result = self.execute(code, args);
        match &result {
            Ok(_) => {
                self.status = VMStatus::Finished;
                self.error = None;
            }
            Err(err) => {
                debug!("'{}' failed: {}", code.name(), err);
                self.status = VMStatus::Error;
                self.error = Some(err.to_string());
            }
        }
        result
    }

    fn execute(
        &self,
        code: &CodeObject,
        args: &[Value],
    ) -> VMResult<Value> {
        let ctx = ShadowContext {
            config: &self.config,
            builtins: &self.builtins,
        };
        let mut frame = Frame::new(code.name().clone(), code.nlocals(), args);
        let mut pc = 0usize;
        let mut ext = 0u32;

        loop {
            let unit = code
                .unit_at(pc)
                .ok_or_else(|| VMError::InvalidState(format!("'{}' ran past its last instruction", code.name())))?;
            let at = pc;
            pc += 1;
            let op = unit.opcode().ok_or(VMError::InvalidOpcode(unit.op))?;
            let arg = (ext << 8) | unit.arg as u32;
            match op {
                Opcode::ExtendedArg => {
                    ext = arg;
                    continue;
                }
                Opcode::ShadowNop => continue,
                _ => ext = 0,
            }
            trace!("{:>4} {} {}", at, op, arg);
            if op.is_specialized() && !code.has_shadow() {
                return Err(VMError::UnexpectedOpcode(op));
            }

            match op {
                Opcode::Nop => {}
                Opcode::ReturnValue => return frame.pop(),
                Opcode::PopTop => {
                    frame.pop()?;
                }
                Opcode::DupTop => {
                    let top = frame.top()?.clone();
                    frame.push(top);
                }
                Opcode::LoadConst => {
                    let value = code
                        .consts()
                        .get(arg as usize)
                        .cloned()
                        .ok_or(VMError::InvalidOperand(arg))?;
                    frame.push(value);
                }
                Opcode::LoadFast => {
                    let value = frame.load_local(arg as usize)?;
                    frame.push(value);
                }
                Opcode::StoreFast => {
                    let value = frame.pop()?;
                    frame.store_local(arg as usize, value)?;
                }
                Opcode::BinaryAdd => {
                    let rhs = frame.pop()?;
                    let lhs = frame.pop()?;
                    frame.push(binary_add(&lhs, &rhs)?);
                }
                Opcode::BuildTuple => {
                    let items = frame.pop_n(arg as usize)?;
                    frame.push(Value::tuple(items));
                }
                Opcode::BuildList => {
                    let items = frame.pop_n(arg as usize)?;
                    frame.push(Value::list(items));
                }
                Opcode::CallFunction => {
                    let args = frame.pop_n(arg as usize)?;
                    let callable = frame.pop()?;
                    frame.push(generic::call(&callable, &args)?);
                }
                Opcode::CallMethod => {
                    let args = frame.pop_n(arg as usize)?;
                    let method = frame.pop_method()?;
                    frame.push(generic::call_method(&method, &args)?);
                }

                // =====================
                // 可特化的通用指令
                // =====================
                Opcode::LoadAttr => {
                    let obj = frame.pop()?;
                    let name = name_at(code, arg)?;
                    let value = if code.has_shadow() {
                        attr::load_attr(&ctx, code, at, &name, &obj)?
                    } else {
                        generic::getattr(&obj, &name)?
                    };
                    frame.push(value);
                }
                Opcode::LoadMethod => {
                    let obj = frame.pop()?;
                    let name = name_at(code, arg)?;
                    let method = if code.has_shadow() {
                        attr::load_method(&ctx, code, at, &name, &obj)?
                    } else {
                        generic::get_method(&obj, &name)?
                    };
                    frame.push_method(method);
                }
                Opcode::StoreAttr => {
                    let obj = frame.pop()?;
                    let value = frame.pop()?;
                    let name = name_at(code, arg)?;
                    if code.has_shadow() {
                        attr::store_attr(&ctx, code, at, &name, &obj, value)?;
                    } else {
                        generic::setattr(&obj, &name, value)?;
                    }
                }
                Opcode::LoadGlobal => {
                    let value = if code.has_shadow() {
                        global::load_global(&ctx, code, at, arg)?
                    } else {
                        let name = name_at(code, arg)?;
                        global::lookup(&ctx, code, name.as_str())
                            .ok_or_else(|| RuntimeError::NameError(name.to_string()))?
                    };
                    frame.push(value);
                }
                Opcode::BinarySubscr => {
                    let key = frame.pop()?;
                    let container = frame.pop()?;
                    let value = if code.has_shadow() {
                        subscr::binary_subscr(code, at, &container, &key)?
                    } else {
                        generic::getitem(&container, &key)?
                    };
                    frame.push(value);
                }

                // =====================
                // 特化指令
                // =====================
                Opcode::LoadAttrSlot
                | Opcode::LoadAttrNoDictDescr
                | Opcode::LoadAttrDictNoDescr
                | Opcode::LoadAttrDictDescr
                | Opcode::LoadAttrSplitDict
                | Opcode::LoadAttrSplitDictDescr
                | Opcode::LoadAttrModule
                | Opcode::LoadAttrType => {
                    let obj = frame.pop()?;
                    frame.push(attr::load_attr_cached(&ctx, code, at, op, arg, &obj)?);
                }
                Opcode::LoadAttrPolymorphic => {
                    let obj = frame.pop()?;
                    frame.push(polymorphic::load_attr_polymorphic(&ctx, code, at, arg, &obj)?);
                }
                Opcode::LoadAttrUncachable => {
                    let obj = frame.pop()?;
                    frame.push(generic::getattr(&obj, &name_at(code, arg)?)?);
                }
                Opcode::LoadMethodNoDictDescr
                | Opcode::LoadMethodNoDictMethod
                | Opcode::LoadMethodDictDescr
                | Opcode::LoadMethodDictMethod
                | Opcode::LoadMethodSplitDictDescr
                | Opcode::LoadMethodSplitDictMethod
                | Opcode::LoadMethodModule
                | Opcode::LoadMethodType => {
                    let obj = frame.pop()?;
                    frame.push_method(attr::load_method_cached(&ctx, code, at, op, arg, &obj)?);
                }
                Opcode::LoadMethodUncachable => {
                    let obj = frame.pop()?;
                    frame.push_method(generic::get_method(&obj, &name_at(code, arg)?)?);
                }
                Opcode::StoreAttrSlot | Opcode::StoreAttrDescr | Opcode::StoreAttrDict | Opcode::StoreAttrSplitDict => {
                    let obj = frame.pop()?;
                    let value = frame.pop()?;
                    attr::store_attr_cached(&ctx, code, at, op, arg, &obj, value)?;
                }
                Opcode::StoreAttrUncachable => {
                    let obj = frame.pop()?;
                    let value = frame.pop()?;
                    generic::setattr(&obj, &name_at(code, arg)?, value)?;
                }
                Opcode::LoadGlobalCached => {
                    frame.push(global::load_global_cached(&ctx, code, at, arg)?);
                }
                Opcode::BinarySubscrDict
                | Opcode::BinarySubscrDictStr
                | Opcode::BinarySubscrList
                | Opcode::BinarySubscrTuple => {
                    let key = frame.pop()?;
                    let container = frame.pop()?;
                    frame.push(subscr::binary_subscr_cached(code, at, op, &container, &key)?);
                }
                Opcode::BinarySubscrTupleConstInt => {
                    match subscr::tuple_const_int(code, at, arg, frame.top()?)? {
                        ConstIntOutcome::Fused(value) => {
                            frame.set_top(value)?;
                            // 跳过紧随的 BinarySubscr
                            pc += 1;
                        }
                        ConstIntOutcome::Deopt(value) => frame.push(value),
                    }
                }
                Opcode::ExtendedArg | Opcode::ShadowNop => {}
            }
        }
    }
}

fn name_at(
    code: &CodeObject,
    index: u32,
) -> VMResult<Name> {
    code.names()
        .get(index as usize)
        .cloned()
        .ok_or(VMError::InvalidOperand(index))
}

/// 加法：整数、浮点、字符串拼接
fn binary_add(
    lhs: &Value,
    rhs: &Value,
) -> RuntimeResult<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::TypeError("integer overflow".to_string())),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
        (Value::Str(a), Value::Str(b)) => Ok(Value::str(&format!("{}{}", a, b))),
        _ => Err(RuntimeError::TypeError(format!(
            "unsupported operand type(s) for +: '{}' and '{}'",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}
