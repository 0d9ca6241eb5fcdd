//! L1 slot table and cache entry tests

use super::*;
use crate::runtime::object::SharedKeys;
use crate::shadow::entry::{CacheEntry, EntryKind, EntryRef, SplitLayout};
use crate::shadow::l1::L1Cache;
use crate::shadow::ShadowError;

fn dict_entry(attr: &str) -> EntryRef {
    CacheEntry::descr(EntryKind::DictNoDescr, fresh_owner(), &name(attr), None)
}

#[cfg(test)]
mod l1_tests {
    use super::*;

    #[test]
    fn test_find_or_add_dedups_by_identity() {
        let mut l1 = L1Cache::new(256);
        let a = dict_entry("a");
        let b = dict_entry("a");
        assert_eq!(l1.find_or_add(&a), Ok(0));
        assert_eq!(l1.find_or_add(&a), Ok(0));
        assert_eq!(l1.find_or_add(&b), Ok(1));
        assert_eq!(l1.capacity(), 2);
    }

    #[test]
    fn test_grows_by_doubling() {
        let mut l1 = L1Cache::new(256);
        let entries: Vec<_> = (0..3).map(|i| dict_entry(&format!("e{}", i))).collect();
        for entry in &entries {
            l1.find_or_add(entry).unwrap();
        }
        assert_eq!(l1.capacity(), 4);
        assert_eq!(l1.live(), 3);
    }

    #[test]
    fn test_limit_is_enforced() {
        let mut l1 = L1Cache::new(2);
        let entries: Vec<_> = (0..3).map(|i| dict_entry(&format!("e{}", i))).collect();
        assert!(l1.find_or_add(&entries[0]).is_ok());
        assert!(l1.find_or_add(&entries[1]).is_ok());
        assert_eq!(l1.find_or_add(&entries[2]), Err(ShadowError::CapacityExceeded(2)));
    }

    #[test]
    fn test_release_clears_unused_slot() {
        let mut l1 = L1Cache::new(256);
        let a = dict_entry("a");
        let index = l1.find_or_add(&a).unwrap();
        l1.retain(index);
        l1.retain(index);
        assert_eq!(l1.uses(index), 2);

        assert!(l1.release(index).is_none());
        assert!(l1.get(index).is_some());
        let released = l1.release(index).unwrap();
        assert!(Rc::ptr_eq(&released, &a));
        assert!(l1.get(index).is_none());
        assert_eq!(l1.live(), 0);

        // 空槽位被复用
        let b = dict_entry("b");
        assert_eq!(l1.find_or_add(&b), Ok(index));
    }
}

#[cfg(test)]
mod entry_tests {
    use super::*;

    #[test]
    fn test_invalidate_clears_owner_and_references() {
        let owner = fresh_owner();
        let entry = CacheEntry::descr(EntryKind::DictDescr, owner, &name("a"), Some(Value::Int(1)));
        assert!(entry.is_valid_for(owner));
        assert!(!entry.is_valid_for(fresh_owner()));
        assert_eq!(entry.value(), Some(Value::Int(1)));

        entry.invalidate();
        assert!(!entry.is_valid());
        assert_eq!(entry.owner(), None);
        assert_eq!(entry.value(), None);
        // 失效条目的元数据仍可读取
        assert_eq!(entry.name().as_str(), "a");
        assert_eq!(entry.kind(), EntryKind::DictDescr);
    }

    #[test]
    fn test_split_layout_snapshot_and_refresh() {
        let keys = SharedKeys::new(4);
        let layout = SplitLayout::probe(&keys, "a");
        assert_eq!(layout.index, None);
        assert_eq!(layout.fingerprint, 0);

        let entry = CacheEntry::split(EntryKind::SplitDict, fresh_owner(), &name("a"), layout, None);
        assert!(entry.kind().is_split());

        let other = SharedKeys::new(4);
        entry.refresh_split(&other);
        assert!(entry.with_split(|l| Rc::ptr_eq(&l.keys, &other)).unwrap());

        entry.invalidate();
        entry.refresh_split(&keys);
        assert!(entry.split_layout().is_none());
    }

    #[test]
    fn test_module_entry_refresh() {
        let entry = CacheEntry::module(fresh_owner(), &name("g"), Value::Int(1), 10);
        entry.refresh_module(Value::Int(2), 11);
        assert_eq!(entry.value(), Some(Value::Int(2)));
        assert_eq!(entry.version(), 11);

        entry.invalidate();
        entry.refresh_module(Value::Int(3), 12);
        assert_eq!(entry.value(), None);
        assert_eq!(entry.version(), 11);
    }

    #[test]
    fn test_slot_entry_keeps_descriptor() {
        let ty = slot_type("P");
        let descr = ty.lookup("x").unwrap();
        let entry = CacheEntry::slot(ty.id(), &name("x"), 0, descr.clone());
        assert_eq!(entry.kind(), EntryKind::Slot);
        assert_eq!(entry.offset(), 0);
        assert_eq!(entry.value(), Some(descr));
    }
}
