//! shadowcode - adaptive inline caching for a bytecode interpreter
//!
//! 每个热函数获得一份私有的影子指令流。属性、方法、全局与下标指令
//! 在执行中观察操作数的实际形态，并把自身改写为绑定缓存条目的特化指令；
//! 类型或命名空间被修改时，缓存条目失效，调用点退回通用路径并重新特化。
//!
//! # Example
//!
//! ```
//! use shadowcode::runtime::object::{Module, TypeBuilder};
//! use shadowcode::runtime::value::Value;
//! use shadowcode::vm::{CodeBuilder, Opcode, VM};
//!
//! let module = Module::new("m");
//! let point = TypeBuilder::new("Point").slot("x").no_dict().build().unwrap();
//! let p = point.instantiate();
//! p.slot_set(0, Some(Value::Int(3)));
//!
//! // def f(p): return p.x
//! let code = CodeBuilder::new("f", &module)
//!     .locals(1)
//!     .load_fast(0)
//!     .load_attr("x")
//!     .return_value()
//!     .build();
//!
//! let mut vm = VM::new();
//! assert_eq!(vm.run(&code, &[Value::Instance(p)]).unwrap(), Value::Int(3));
//! assert_eq!(code.current_instr(1).map(|(op, _)| op), Some(Opcode::LoadAttrSlot));
//! ```

#![warn(rust_2018_idioms)]

// Public modules
pub mod demo;
pub mod runtime;
pub mod shadow;
pub mod vm;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

pub use shadow::stats::{self, CacheStats};
pub use shadow::{clear_code_cache, clear_module_cache, clear_type_cache, init_cache};
pub use util::config::ShadowConfig;
pub use vm::{CodeBuilder, CodeObject, VM};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "shadowcode";
