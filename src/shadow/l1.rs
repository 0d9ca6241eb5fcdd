//! Per-function cache slot table (L1)
//!
//! 特化指令的操作数是 L1 槽位索引。槽位按条目身份去重，
//! 并记录引用它的特化指令数量；数量归零时槽位清空。

use std::rc::Rc;

use crate::shadow::entry::EntryRef;
use crate::shadow::{stats, ShadowError};

/// 初始容量
const INITIAL_SLOTS: usize = 2;

/// 槽位
#[derive(Debug)]
pub struct L1Item {
    pub entry: EntryRef,
    /// 引用该槽位的特化指令数
    pub uses: u32,
}

/// L1 槽位表
#[derive(Debug)]
pub struct L1Cache {
    items: Vec<Option<L1Item>>,
    limit: usize,
}

impl L1Cache {
    pub fn new(limit: usize) -> Self {
        Self {
            items: Vec::new(),
            limit: limit.clamp(1, 256),
        }
    }

    /// 查找条目所在槽位，或放入空槽位（必要时按倍数扩容）
    pub fn find_or_add(
        &mut self,
        entry: &EntryRef,
    ) -> Result<usize, ShadowError> {
        let mut free = None;
        for (i, item) in self.items.iter().enumerate() {
            match item {
                Some(item) if Rc::ptr_eq(&item.entry, entry) => return Ok(i),
                None if free.is_none() => free = Some(i),
                _ => {}
            }
        }

        let index = match free {
            Some(i) => i,
            None => {
                let index = self.items.len();
                self.grow()?;
                index
            }
        };
        self.items[index] = Some(L1Item {
            entry: entry.clone(),
            uses: 0,
        });
        Ok(index)
    }

    fn grow(&mut self) -> Result<(), ShadowError> {
        let len = self.items.len();
        if len >= self.limit {
            return Err(ShadowError::CapacityExceeded(self.limit));
        }
        let new_len = (len * 2).max(INITIAL_SLOTS).min(self.limit);
        self.items
            .try_reserve_exact(new_len - len)
            .map_err(|_| ShadowError::OutOfMemory)?;
        self.items.resize_with(new_len, || None);
        stats::add_size((new_len - len) * std::mem::size_of::<Option<L1Item>>());
        Ok(())
    }

    /// 增加引用
    pub fn retain(
        &mut self,
        index: usize,
    ) {
        if let Some(Some(item)) = self.items.get_mut(index) {
            item.uses += 1;
        }
    }

    /// 释放引用；无引用时清空槽位
    pub fn release(
        &mut self,
        index: usize,
    ) -> Option<EntryRef> {
        let slot = self.items.get_mut(index)?;
        let item = slot.as_mut()?;
        item.uses = item.uses.saturating_sub(1);
        if item.uses == 0 {
            return slot.take().map(|item| item.entry);
        }
        None
    }

    pub fn get(
        &self,
        index: usize,
    ) -> Option<&EntryRef> {
        self.items.get(index)?.as_ref().map(|item| &item.entry)
    }

    pub fn uses(
        &self,
        index: usize,
    ) -> u32 {
        self.items
            .get(index)
            .and_then(|s| s.as_ref())
            .map_or(0, |item| item.uses)
    }

    /// 当前容量
    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    /// 非空槽位数
    pub fn live(&self) -> usize {
        self.items.iter().filter(|s| s.is_some()).count()
    }

    /// 内存占用估算
    pub fn footprint(&self) -> usize {
        self.items.len() * std::mem::size_of::<Option<L1Item>>()
    }
}
