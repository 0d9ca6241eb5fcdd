//! Object model
//!
//! 类型对象、实例、实例字典与模块。缓存层通过这里暴露的布局信息
//! （MRO、描述符、共享键表、命名空间版本）解析缓存策略，
//! 并通过 `Drop` 得知所有者销毁。

pub mod dict;
pub mod generic;
mod instance;
mod module;
mod types;

pub use dict::{InstanceDict, Namespace, SharedKeys};
pub use instance::Instance;
pub use module::Module;
pub use types::{TypeBuilder, TypeObject};

#[cfg(test)]
mod tests;
