//! VM errors

use thiserror::Error;

use crate::runtime::errors::RuntimeError;
use crate::vm::opcode::Opcode;

/// VM result
pub type VMResult<T> = Result<T, VMError>;

/// VM errors
#[derive(Debug, Error)]
pub enum VMError {
    #[error("Invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),

    #[error("Unexpected opcode in canonical code: {0}")]
    UnexpectedOpcode(Opcode),

    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Invalid operand: {0}")]
    InvalidOperand(u32),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl VMError {
    /// 用户可见的运行时错误
    pub fn as_runtime(&self) -> Option<&RuntimeError> {
        match self {
            VMError::Runtime(err) => Some(err),
            _ => None,
        }
    }
}
