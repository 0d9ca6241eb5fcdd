//! VM instructions
//!
//! 代码单元编码与 `ExtendedArg` 前缀处理。

use smallvec::SmallVec;

use crate::vm::opcode::Opcode;

/// 代码单元：8 位操作码 + 8 位操作数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeUnit {
    /// Opcode byte
    pub op: u8,
    /// Operand byte
    pub arg: u8,
}

impl CodeUnit {
    pub fn new(
        op: Opcode,
        arg: u8,
    ) -> Self {
        Self { op: op as u8, arg }
    }

    /// 解码操作码
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::try_from(self.op).ok()
    }

    /// 是否是前缀或填充单元
    pub fn is_prefix(&self) -> bool {
        self.op == Opcode::ExtendedArg as u8 || self.op == Opcode::ShadowNop as u8
    }
}

/// 一条完整指令的编码（最多 4 个单元）
pub type Encoded = SmallVec<[CodeUnit; 4]>;

/// 编码操作数所需的单元数
pub fn instr_size(arg: u32) -> usize {
    if arg <= 0xff {
        1
    } else if arg <= 0xffff {
        2
    } else if arg <= 0xff_ffff {
        3
    } else {
        4
    }
}

/// 编码指令：`ExtendedArg` 前缀（高位在前）+ 指令本身
pub fn encode(
    op: Opcode,
    arg: u32,
) -> Encoded {
    let size = instr_size(arg);
    let mut units = Encoded::new();
    for shift in (1..size).rev() {
        units.push(CodeUnit::new(
            Opcode::ExtendedArg,
            ((arg >> (8 * shift)) & 0xff) as u8,
        ));
    }
    units.push(CodeUnit::new(op, (arg & 0xff) as u8));
    units
}

/// 读取结束于 `at` 的指令的完整操作数（合并 `ExtendedArg` 前缀）
pub fn read_arg(
    code: &[CodeUnit],
    at: usize,
) -> u32 {
    let mut arg = code[at].arg as u32;
    let mut shift = 8;
    let mut i = at;
    while i > 0 && shift < 32 {
        let prev = code[i - 1];
        if prev.op != Opcode::ExtendedArg as u8 {
            break;
        }
        arg |= (prev.arg as u32) << shift;
        shift += 8;
        i -= 1;
    }
    arg
}
