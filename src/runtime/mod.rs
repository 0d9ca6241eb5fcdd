//! Runtime system
//!
//! 值、对象模型与通用属性协议。

pub mod errors;
pub mod object;
pub mod value;
