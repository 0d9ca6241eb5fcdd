//! Instruction stream rewriter
//!
//! 在影子字节码中原地替换一条指令。新编码不得比旧编码宽；
//! 多余的宽度用 `ShadowNop` 填充。编码先在缓冲区中完整生成，再一次写入。

use crate::shadow::ShadowCode;
use crate::vm::instructions::{encode, instr_size, read_arg, CodeUnit};
use crate::vm::opcode::Opcode;

/// 结束于 `at` 的指令占用的单元数（含 `ExtendedArg` 与 `ShadowNop` 前缀）
pub fn opsize(
    code: &[CodeUnit],
    at: usize,
) -> usize {
    let mut size = 1;
    let mut i = at;
    while i > 0 && code[i - 1].is_prefix() {
        size += 1;
        i -= 1;
    }
    size
}

/// 替换结束于 `at` 的指令
///
/// 返回 `false` 表示新编码更宽，影子字节码保持不变。
/// 被替换的指令若引用 L1 槽位，先释放该引用。
pub fn patch(
    shadow: &mut ShadowCode,
    at: usize,
    op: Opcode,
    arg: u32,
) -> bool {
    if at >= shadow.code.len() {
        debug_assert!(false, "patch target {} out of range", at);
        return false;
    }
    let old_size = opsize(&shadow.code, at);
    if instr_size(arg) > old_size {
        tracing::trace!("patch rejected at {}: {} ({:#x}) is wider than {} units", at, op, arg, old_size);
        return false;
    }
    let encoded = encode(op, arg);

    if let Some(current) = shadow.code[at].opcode() {
        if current.is_cache_opcode() {
            let old_index = read_arg(&shadow.code, at) as usize;
            drop(shadow.l1.release(old_index));
        }
    }

    let start = at + 1 - old_size;
    let padding = old_size - encoded.len();
    for unit in &mut shadow.code[start..start + padding] {
        *unit = CodeUnit::new(Opcode::ShadowNop, 0);
    }
    shadow.code[start + padding..=at].copy_from_slice(&encoded);
    true
}
