//! Subscript specialization
//!
//! `BinarySubscr` 按容器形态特化；形态不符时改回通用指令。
//! 元组以紧邻的非负整数常量作下标时，把前面的 `LoadConst` 改写为
//! `BinarySubscrTupleConstInt`，一次完成取常量与下标（随后的
//! `BinarySubscr` 被跳过）。

use crate::runtime::errors::{RuntimeError, RuntimeResult};
use crate::runtime::object::generic;
use crate::runtime::value::{DictKey, Value};
use crate::shadow::{rewriter, stats, ShadowCode};
use crate::vm::code::CodeObject;
use crate::vm::opcode::Opcode;

/// 融合指令的执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum ConstIntOutcome {
    /// 已完成下标，替换栈顶并跳过随后的 `BinarySubscr`
    Fused(Value),
    /// 已改回 `LoadConst`，压入常量后照常执行 `BinarySubscr`
    Deopt(Value),
}

fn specialize_for(
    container: &Value,
    key: &Value,
) -> Option<Opcode> {
    match (container, key) {
        (Value::Dict(_), Value::Str(_)) => Some(Opcode::BinarySubscrDictStr),
        (Value::Dict(_), _) => Some(Opcode::BinarySubscrDict),
        (Value::List(_), Value::Int(_)) => Some(Opcode::BinarySubscrList),
        (Value::Tuple(_), Value::Int(_)) => Some(Opcode::BinarySubscrTuple),
        _ => None,
    }
}

/// 尝试把 `at` 之前的 `LoadConst` 融合为 `BinarySubscrTupleConstInt`
fn fuse_const_int(
    shadow: &mut ShadowCode,
    code: &CodeObject,
    at: usize,
) -> bool {
    let Some(prev) = at.checked_sub(1) else {
        return false;
    };
    if code.original_op(prev) != Some(Opcode::LoadConst)
        || shadow.code[prev].opcode() != Some(Opcode::LoadConst)
    {
        return false;
    }
    let index = match code.consts().get(code.original_arg(prev) as usize) {
        Some(Value::Int(i)) if *i >= 0 && *i <= u32::MAX as i64 => *i as u32,
        _ => return false,
    };
    rewriter::patch(shadow, prev, Opcode::BinarySubscrTupleConstInt, index)
}

/// 未特化的 `BinarySubscr`
pub fn binary_subscr(
    code: &CodeObject,
    at: usize,
    container: &Value,
    key: &Value,
) -> RuntimeResult<Value> {
    let target = specialize_for(container, key);
    {
        let mut guard = code.shadow.borrow_mut();
        if let Some(shadow) = guard.as_mut() {
            match target {
                Some(Opcode::BinarySubscrTuple) if fuse_const_int(shadow, code, at) => {
                    stats::record_entry(Opcode::BinarySubscrTupleConstInt);
                }
                Some(op) => {
                    if rewriter::patch(shadow, at, op, 0) {
                        stats::record_entry(op);
                    }
                }
                None => {
                    if shadow.code[at].opcode() != Some(Opcode::BinarySubscr) {
                        rewriter::patch(shadow, at, Opcode::BinarySubscr, 0);
                    }
                    stats::record_uncacheable(
                        Opcode::BinarySubscr,
                        stats::UncacheableReason::UnsupportedReceiver,
                        None,
                    );
                }
            }
        }
    }
    generic::getitem(container, key)
}

/// 特化的 `BinarySubscr*`
pub fn binary_subscr_cached(
    code: &CodeObject,
    at: usize,
    op: Opcode,
    container: &Value,
    key: &Value,
) -> RuntimeResult<Value> {
    let result = match (op, container, key) {
        (Opcode::BinarySubscrDictStr, Value::Dict(map), Value::Str(s)) => Some(
            map.borrow()
                .get(&DictKey::Str(s.clone()))
                .cloned()
                .ok_or_else(|| RuntimeError::KeyError(format!("{:?}", key))),
        ),
        (Opcode::BinarySubscrDict, Value::Dict(_), _) => Some(generic::getitem(container, key)),
        (Opcode::BinarySubscrList, Value::List(items), Value::Int(_)) => {
            let items = items.borrow();
            Some(generic::sequence_index(key, items.len(), "list").map(|i| items[i].clone()))
        }
        (Opcode::BinarySubscrTuple, Value::Tuple(items), Value::Int(_)) => {
            Some(generic::sequence_index(key, items.len(), "tuple").map(|i| items[i].clone()))
        }
        _ => None,
    };
    if let Some(result) = result {
        stats::record_hit(op);
        return result;
    }
    stats::record_miss(op);
    binary_subscr(code, at, container, key)
}

/// `BinarySubscrTupleConstInt`：栈顶为元组时直接取下标为 `index` 的元素
///
/// 其余情况把指令改回 `LoadConst`（保留原操作数）并返回该常量。
pub fn tuple_const_int(
    code: &CodeObject,
    at: usize,
    index: u32,
    tos: &Value,
) -> RuntimeResult<ConstIntOutcome> {
    if let Value::Tuple(items) = tos {
        if let Some(value) = items.get(index as usize) {
            stats::record_hit(Opcode::BinarySubscrTupleConstInt);
            return Ok(ConstIntOutcome::Fused(value.clone()));
        }
    }
    stats::record_miss(Opcode::BinarySubscrTupleConstInt);
    let original = code.original_arg(at);
    let value = code
        .consts()
        .get(original as usize)
        .cloned()
        .ok_or_else(|| RuntimeError::IndexError(format!("constant {} out of range", original)))?;
    if let Some(shadow) = code.shadow.borrow_mut().as_mut() {
        rewriter::patch(shadow, at, Opcode::LoadConst, original);
    }
    Ok(ConstIntOutcome::Deopt(value))
}
