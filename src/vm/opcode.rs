//! 字节码操作码定义
//!
//! 每条指令由若干 16 位代码单元组成：8 位操作码 + 8 位操作数。
//! 超过 8 位的操作数通过 `ExtendedArg` 前缀单元携带（最多 32 位）。
//!
//! 指令编码空间规划：
//! - 0x00-0x0F：基础操作
//! - 0x10-0x1F：可特化的通用指令
//! - 0x90-0x9F：前缀与填充
//! - 0xA0-0xAF：特化属性读取
//! - 0xB0-0xBF：特化方法读取
//! - 0xC0-0xCF：特化属性写入
//! - 0xD0-0xDF：特化全局读取与下标

use std::fmt;

macro_rules! opcodes {
    ($($(#[$meta:meta])* $name:ident = $value:expr,)*) => {
        /// 字节码操作码
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$meta])* $name = $value,)*
        }

        impl Opcode {
            /// 所有操作码
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// 获取操作码名称
            pub fn name(&self) -> &'static str {
                match self {
                    $(Opcode::$name => stringify!($name),)*
                }
            }
        }

        /// 从字节值创建 Opcode
        impl TryFrom<u8> for Opcode {
            type Error = ();

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $(v if v == $value => Ok(Opcode::$name),)*
                    _ => Err(()),
                }
            }
        }
    };
}

opcodes! {
    // =====================
    // 基础操作 (0x00-0x0F)
    // =====================
    /// 空操作
    Nop = 0x00,
    /// 返回栈顶
    ReturnValue = 0x01,
    /// 弹出栈顶
    PopTop = 0x02,
    /// 复制栈顶
    DupTop = 0x03,
    /// 压入常量
    /// 操作数：常量索引
    LoadConst = 0x04,
    /// 压入局部变量
    /// 操作数：局部变量索引
    LoadFast = 0x05,
    /// 保存局部变量
    /// 操作数：局部变量索引
    StoreFast = 0x06,
    /// 加法（整数、浮点、字符串）
    BinaryAdd = 0x07,
    /// 构建元组
    /// 操作数：元素数量
    BuildTuple = 0x08,
    /// 构建列表
    /// 操作数：元素数量
    BuildList = 0x09,
    /// 调用栈上的可调用对象
    /// 操作数：参数数量
    CallFunction = 0x0A,
    /// 调用 `LoadMethod` 的结果
    /// 操作数：参数数量
    CallMethod = 0x0B,

    // =====================
    // 可特化的通用指令 (0x10-0x1F)
    // =====================
    /// 读取属性
    /// 操作数：名称索引
    LoadAttr = 0x10,
    /// 读取方法（为 `CallMethod` 准备）
    /// 操作数：名称索引
    LoadMethod = 0x11,
    /// 写入属性：TOS 为对象，TOS1 为值
    /// 操作数：名称索引
    StoreAttr = 0x12,
    /// 读取全局变量（模块命名空间，然后是内置命名空间）
    /// 操作数：名称索引
    LoadGlobal = 0x13,
    /// 下标读取：TOS 为键，TOS1 为容器
    BinarySubscr = 0x14,

    // =====================
    // 前缀与填充 (0x90-0x9F)
    // =====================
    /// 操作数扩展前缀
    ExtendedArg = 0x90,
    /// 影子字节码填充（与 `Nop` 区分，表示被缩短的指令）
    ShadowNop = 0x91,

    // =====================
    // 特化属性读取 (0xA0-0xAF)
    // 操作数：L1 缓存槽位
    // =====================
    LoadAttrSlot = 0xA0,
    LoadAttrNoDictDescr = 0xA1,
    LoadAttrDictNoDescr = 0xA2,
    LoadAttrDictDescr = 0xA3,
    LoadAttrSplitDict = 0xA4,
    LoadAttrSplitDictDescr = 0xA5,
    LoadAttrModule = 0xA6,
    LoadAttrType = 0xA7,
    /// 操作数：多态缓存索引
    LoadAttrPolymorphic = 0xA8,
    /// 操作数：名称索引
    LoadAttrUncachable = 0xA9,

    // =====================
    // 特化方法读取 (0xB0-0xBF)
    // 操作数：L1 缓存槽位
    // =====================
    LoadMethodNoDictDescr = 0xB0,
    LoadMethodNoDictMethod = 0xB1,
    LoadMethodDictDescr = 0xB2,
    LoadMethodDictMethod = 0xB3,
    LoadMethodSplitDictDescr = 0xB4,
    LoadMethodSplitDictMethod = 0xB5,
    LoadMethodModule = 0xB6,
    LoadMethodType = 0xB7,
    /// 操作数：名称索引
    LoadMethodUncachable = 0xB8,

    // =====================
    // 特化属性写入 (0xC0-0xCF)
    // 操作数：L1 缓存槽位
    // =====================
    StoreAttrSlot = 0xC0,
    StoreAttrDescr = 0xC1,
    StoreAttrDict = 0xC2,
    StoreAttrSplitDict = 0xC3,
    /// 操作数：名称索引
    StoreAttrUncachable = 0xC4,

    // =====================
    // 特化全局读取与下标 (0xD0-0xDF)
    // =====================
    /// 操作数：全局缓存索引
    LoadGlobalCached = 0xD0,
    BinarySubscrDict = 0xD1,
    BinarySubscrDictStr = 0xD2,
    BinarySubscrList = 0xD3,
    BinarySubscrTuple = 0xD4,
    /// 融合 `LoadConst` 与 `BinarySubscr`
    /// 操作数：非负整数下标
    BinarySubscrTupleConstInt = 0xD5,
}

impl Opcode {
    /// 操作数是否是 L1 缓存槽位
    pub fn is_cache_opcode(&self) -> bool {
        matches!(
            self,
            Opcode::LoadAttrSlot
                | Opcode::LoadAttrNoDictDescr
                | Opcode::LoadAttrDictNoDescr
                | Opcode::LoadAttrDictDescr
                | Opcode::LoadAttrSplitDict
                | Opcode::LoadAttrSplitDictDescr
                | Opcode::LoadAttrModule
                | Opcode::LoadAttrType
                | Opcode::LoadMethodNoDictDescr
                | Opcode::LoadMethodNoDictMethod
                | Opcode::LoadMethodDictDescr
                | Opcode::LoadMethodDictMethod
                | Opcode::LoadMethodSplitDictDescr
                | Opcode::LoadMethodSplitDictMethod
                | Opcode::LoadMethodModule
                | Opcode::LoadMethodType
                | Opcode::StoreAttrSlot
                | Opcode::StoreAttrDescr
                | Opcode::StoreAttrDict
                | Opcode::StoreAttrSplitDict
        )
    }

    /// 是否是特化指令（只出现在影子字节码中）
    pub fn is_specialized(&self) -> bool {
        (*self as u8) >= 0xA0
    }

    /// 特化指令对应的通用指令
    pub fn generic(&self) -> Opcode {
        match *self as u8 {
            0xA0..=0xAF => Opcode::LoadAttr,
            0xB0..=0xBF => Opcode::LoadMethod,
            0xC0..=0xCF => Opcode::StoreAttr,
            0xD0 => Opcode::LoadGlobal,
            0xD1..=0xD4 => Opcode::BinarySubscr,
            0xD5 => Opcode::LoadConst,
            _ => *self,
        }
    }

    /// 该指令族的不可缓存版本
    pub fn uncachable(&self) -> Option<Opcode> {
        match self.generic() {
            Opcode::LoadAttr => Some(Opcode::LoadAttrUncachable),
            Opcode::LoadMethod => Some(Opcode::LoadMethodUncachable),
            Opcode::StoreAttr => Some(Opcode::StoreAttrUncachable),
            _ => None,
        }
    }

    /// 是否带操作数
    pub fn has_arg(&self) -> bool {
        !matches!(
            self,
            Opcode::Nop
                | Opcode::ReturnValue
                | Opcode::PopTop
                | Opcode::DupTop
                | Opcode::BinaryAdd
                | Opcode::BinarySubscr
                | Opcode::ShadowNop
                | Opcode::BinarySubscrDict
                | Opcode::BinarySubscrDictStr
                | Opcode::BinarySubscrList
                | Opcode::BinarySubscrTuple
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
