//! Virtual Machine and bytecode execution
//!
//! 栈式字节码解释器、代码对象与指令编码。

pub mod code;
pub mod errors;
pub mod executor;
pub mod frames;
pub mod instructions;
pub mod opcode;

pub use code::{CodeBuilder, CodeObject};
pub use errors::{VMError, VMResult};
pub use executor::{VMStatus, VM};
pub use opcode::Opcode;

#[cfg(test)]
mod tests;
