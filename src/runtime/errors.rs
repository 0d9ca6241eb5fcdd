//! Runtime errors
//!
//! 由通用路径（generic get/set/call/subscript）抛出的用户可见错误。
//! 缓存层本身从不产生这些错误：解析失败只意味着"不缓存"，
//! 真正的查找与报错由通用路径完成。

use thiserror::Error;

/// Runtime result
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Runtime errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("AttributeError: {0}")]
    AttributeError(String),

    #[error("TypeError: {0}")]
    TypeError(String),

    #[error("KeyError: {0}")]
    KeyError(String),

    #[error("IndexError: {0}")]
    IndexError(String),

    #[error("NameError: name '{0}' is not defined")]
    NameError(String),

    #[error("UnboundLocalError: local variable {0} referenced before assignment")]
    UnboundLocal(usize),
}

impl RuntimeError {
    /// `'T' object has no attribute 'x'`
    pub fn no_attribute(
        type_name: &str,
        name: &str,
    ) -> Self {
        RuntimeError::AttributeError(format!(
            "'{}' object has no attribute '{}'",
            type_name, name
        ))
    }

    /// `module 'm' has no attribute 'x'`
    pub fn no_module_attribute(
        module_name: &str,
        name: &str,
    ) -> Self {
        RuntimeError::AttributeError(format!(
            "module '{}' has no attribute '{}'",
            module_name, name
        ))
    }

    /// `type object 'T' has no attribute 'x'`
    pub fn no_type_attribute(
        type_name: &str,
        name: &str,
    ) -> Self {
        RuntimeError::AttributeError(format!(
            "type object '{}' has no attribute '{}'",
            type_name, name
        ))
    }

    /// Is this an attribute error
    pub fn is_attribute_error(&self) -> bool {
        matches!(self, RuntimeError::AttributeError(_))
    }
}
