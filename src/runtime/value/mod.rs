//! Core value types
//!
//! 解释器值、驻留名称、对象标识与描述符。

pub mod runtime_value;
pub use runtime_value::*;

#[cfg(test)]
mod tests;
