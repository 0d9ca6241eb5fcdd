//! VM call frames

use crate::runtime::errors::RuntimeError;
use crate::runtime::value::{MethodRef, Name, Value};
use crate::vm::errors::{VMError, VMResult};

/// Call frame
#[derive(Debug)]
pub struct Frame {
    /// Function name
    pub name: Name,
    /// Local variables
    pub locals: Vec<Option<Value>>,
    /// Value stack
    stack: Vec<Value>,
    /// `LoadMethod` 结果，供随后的 `CallMethod` 使用
    methods: Vec<MethodRef>,
}

impl Frame {
    /// Create a new frame
    pub fn new(
        name: Name,
        nlocals: usize,
        args: &[Value],
    ) -> Self {
        let mut locals = vec![None; nlocals.max(args.len())];
        for (slot, arg) in locals.iter_mut().zip(args) {
            *slot = Some(arg.clone());
        }
        Self {
            name,
            locals,
            stack: Vec::with_capacity(16),
            methods: Vec::new(),
        }
    }

    pub fn push(
        &mut self,
        value: Value,
    ) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> VMResult<Value> {
        self.stack.pop().ok_or(VMError::StackUnderflow)
    }

    pub fn top(&self) -> VMResult<&Value> {
        self.stack.last().ok_or(VMError::StackUnderflow)
    }

    /// 替换栈顶
    pub fn set_top(
        &mut self,
        value: Value,
    ) -> VMResult<()> {
        let top = self.stack.last_mut().ok_or(VMError::StackUnderflow)?;
        *top = value;
        Ok(())
    }

    /// 弹出 `n` 个值（按压入顺序返回）
    pub fn pop_n(
        &mut self,
        n: usize,
    ) -> VMResult<Vec<Value>> {
        if n > self.stack.len() {
            return Err(VMError::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn push_method(
        &mut self,
        method: MethodRef,
    ) {
        self.methods.push(method);
    }

    pub fn pop_method(&mut self) -> VMResult<MethodRef> {
        self.methods.pop().ok_or(VMError::StackUnderflow)
    }

    pub fn load_local(
        &self,
        index: usize,
    ) -> VMResult<Value> {
        match self.locals.get(index) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(RuntimeError::UnboundLocal(index).into()),
            None => Err(VMError::InvalidOperand(index as u32)),
        }
    }

    pub fn store_local(
        &mut self,
        index: usize,
        value: Value,
    ) -> VMResult<()> {
        let slot = self
            .locals
            .get_mut(index)
            .ok_or(VMError::InvalidOperand(index as u32))?;
        *slot = Some(value);
        Ok(())
    }
}
