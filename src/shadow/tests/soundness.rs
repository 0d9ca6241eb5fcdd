//! Randomized equivalence tests: cached execution against the canonical interpreter

use std::cell::Cell;

use super::*;
use crate::runtime::object::generic;
use crate::runtime::value::{Function, Property};
use crate::vm::errors::VMResult;
use proptest::prelude::*;

const TYPES: usize = 6;
const RECEIVERS: usize = 11;
const ATTRS: [&str; 5] = ["x", "m", "a", "b", "c"];

/// 被执行的调用点
#[derive(Debug, Clone)]
enum Site {
    /// `(o.x, G)`
    Load,
    /// `o.m()`
    Method,
    /// `o.x = v; return o.x`
    Store(i64),
}

/// 写入类型字典的描述符
#[derive(Debug, Clone)]
enum Descr {
    Method(i64),
    Property(i64),
    RwProperty,
}

/// 对元类型的修改
#[derive(Debug, Clone)]
enum MetaChange {
    Property(i64),
    Plain(i64),
    Delete,
}

/// 对共享对象图的一次操作
#[derive(Debug, Clone)]
enum Action {
    Call(Site, usize),
    SetClassAttr(usize, usize, i64),
    SetClassDescr(usize, Descr),
    DelClassAttr(usize, usize),
    SetAttr(usize, usize, i64),
    DelAttr(usize, usize),
    Meta(MetaChange),
    SetGlobal(i64),
    DelGlobal,
}

fn site_strategy() -> impl Strategy<Value = Site> {
    prop_oneof![
        3 => Just(Site::Load),
        2 => Just(Site::Method),
        2 => (-3i64..3).prop_map(Site::Store),
    ]
}

fn descr_strategy() -> impl Strategy<Value = Descr> {
    prop_oneof![
        (-3i64..3).prop_map(Descr::Method),
        (-3i64..3).prop_map(Descr::Property),
        Just(Descr::RwProperty),
    ]
}

fn meta_strategy() -> impl Strategy<Value = MetaChange> {
    prop_oneof![
        (-3i64..3).prop_map(MetaChange::Property),
        (-3i64..3).prop_map(MetaChange::Plain),
        Just(MetaChange::Delete),
    ]
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        8 => (site_strategy(), 0..RECEIVERS).prop_map(|(s, r)| Action::Call(s, r)),
        1 => (0..TYPES, 0..ATTRS.len(), -3i64..3).prop_map(|(t, a, v)| Action::SetClassAttr(t, a, v)),
        1 => (0..TYPES, descr_strategy()).prop_map(|(t, d)| Action::SetClassDescr(t, d)),
        1 => (0..TYPES, 0..ATTRS.len()).prop_map(|(t, a)| Action::DelClassAttr(t, a)),
        3 => (0..RECEIVERS, 0..ATTRS.len(), -3i64..3).prop_map(|(r, a, v)| Action::SetAttr(r, a, v)),
        2 => (0..RECEIVERS, 0..ATTRS.len()).prop_map(|(r, a)| Action::DelAttr(r, a)),
        1 => meta_strategy().prop_map(Action::Meta),
        1 => (-3i64..3).prop_map(Action::SetGlobal),
        1 => Just(Action::DelGlobal),
    ]
}

/// 同一组调用点的一份字节码
struct Sites {
    load: CodeObject,
    method: CodeObject,
    store: CodeObject,
}

struct World {
    module: Rc<Module>,
    meta: Rc<TypeObject>,
    types: Vec<Rc<TypeObject>>,
    receivers: Vec<Value>,
    backing: Rc<Cell<i64>>,
}

impl World {
    fn new() -> Self {
        let module = Module::new("world");
        module.set("x", Value::Int(100));
        module.set("G", Value::Int(0));

        let slots = TypeBuilder::new("Slots")
            .slot("x")
            .no_dict()
            .method("m", |_| Ok(Value::Int(10)))
            .build()
            .unwrap();
        let split = TypeBuilder::new("Split")
            .attr("x", Value::Int(0))
            .method("m", |_| Ok(Value::Int(20)))
            .build()
            .unwrap();
        let derived = TypeBuilder::new("Derived").base(&split).build().unwrap();
        let combined = TypeBuilder::new("Combined").combined_dict().build().unwrap();
        let tight = TypeBuilder::new("Tight")
            .keys_capacity(1)
            .method("m", |_| Ok(Value::Int(30)))
            .build()
            .unwrap();
        let meta = TypeBuilder::new("Meta").build().unwrap();
        let with_meta = TypeBuilder::new("WithMeta")
            .metatype(&meta)
            .attr("x", Value::Int(5))
            .build()
            .unwrap();

        let a = split.instantiate();
        a.set_dict_item(&name("x"), Value::Int(1)).unwrap();
        let b = split.instantiate();
        b.set_dict_item(&name("y"), Value::Int(2)).unwrap();
        let d = derived.instantiate();
        let c = combined.instantiate();
        c.set_dict_item(&name("x"), Value::Int(3)).unwrap();
        let t1 = tight.instantiate();
        t1.set_dict_item(&name("x"), Value::Int(4)).unwrap();
        let t2 = tight.instantiate();
        let w = with_meta.instantiate();

        let receivers = vec![
            slot_instance(&slots, 7),
            Value::Instance(a),
            Value::Instance(b),
            Value::Instance(d),
            Value::Instance(c),
            Value::Type(split.clone()),
            Value::Module(module.clone()),
            Value::Instance(t1),
            Value::Instance(t2),
            Value::Type(with_meta.clone()),
            Value::Instance(w),
        ];
        Self {
            module,
            meta,
            types: vec![slots, split, derived, combined, tight, with_meta],
            receivers,
            backing: Rc::new(Cell::new(0)),
        }
    }

    fn sites(&self) -> Sites {
        let load = CodeBuilder::new("load", &self.module)
            .locals(1)
            .load_fast(0)
            .load_attr("x")
            .load_global("G")
            .build_tuple(2)
            .return_value()
            .build();
        let method = CodeBuilder::new("method", &self.module)
            .locals(1)
            .load_fast(0)
            .load_method("m")
            .call_method(0)
            .return_value()
            .build();
        let store = CodeBuilder::new("store", &self.module)
            .locals(2)
            .load_fast(1)
            .load_fast(0)
            .store_attr("x")
            .load_fast(0)
            .load_attr("x")
            .return_value()
            .build();
        Sites {
            load,
            method,
            store,
        }
    }

    fn descr(
        &self,
        descr: &Descr,
    ) -> Value {
        match descr {
            Descr::Method(v) => {
                let v = *v;
                Value::Function(Function::new("m", move |_| Ok(Value::Int(v))))
            }
            Descr::Property(v) => {
                let v = *v;
                Value::Property(Property::readonly("x", move |_| Ok(Value::Int(v))))
            }
            Descr::RwProperty => {
                let get = self.backing.clone();
                let set = self.backing.clone();
                Value::Property(Property::read_write(
                    "x",
                    move |_| Ok(Value::Int(get.get())),
                    move |_, v| {
                        set.set(v.as_int().unwrap_or(0));
                        Ok(())
                    },
                ))
            }
        }
    }

    /// 执行修改；失败的修改对两边同样失败，忽略即可
    fn mutate(
        &self,
        action: &Action,
    ) {
        let x = name("x");
        let _ = match action {
            Action::Call(..) => Ok(()),
            Action::SetClassAttr(t, a, v) => {
                self.types[*t].set_attr(&name(ATTRS[*a]), Value::Int(*v));
                Ok(())
            }
            Action::SetClassDescr(t, descr) => {
                let attr = match descr {
                    Descr::Method(_) => name("m"),
                    _ => x,
                };
                self.types[*t].set_attr(&attr, self.descr(descr));
                Ok(())
            }
            Action::DelClassAttr(t, a) => self.types[*t].del_attr(&name(ATTRS[*a])),
            Action::SetAttr(r, a, v) => generic::setattr(&self.receivers[*r], &name(ATTRS[*a]), Value::Int(*v)),
            Action::DelAttr(r, a) => generic::delattr(&self.receivers[*r], &name(ATTRS[*a])),
            Action::Meta(MetaChange::Property(v)) => {
                self.meta.set_attr(&x, self.descr(&Descr::Property(*v)));
                Ok(())
            }
            Action::Meta(MetaChange::Plain(v)) => {
                self.meta.set_attr(&x, Value::Int(*v));
                Ok(())
            }
            Action::Meta(MetaChange::Delete) => self.meta.del_attr(&x),
            Action::SetGlobal(v) => {
                self.module.set("G", Value::Int(*v));
                Ok(())
            }
            Action::DelGlobal => {
                self.module.remove("G");
                Ok(())
            }
        };
    }
}

fn run_site(
    vm: &mut VM,
    sites: &Sites,
    site: &Site,
    receiver: Value,
) -> VMResult<Value> {
    match site {
        Site::Load => vm.run(&sites.load, &[receiver]),
        Site::Method => vm.run(&sites.method, &[receiver]),
        Site::Store(v) => vm.run(&sites.store, &[receiver, Value::Int(*v)]),
    }
}

fn same_outcome(
    cached: &VMResult<Value>,
    plain: &VMResult<Value>,
) -> bool {
    match (cached, plain) {
        (Ok(a), Ok(b)) => a == b,
        (Err(a), Err(b)) => a.to_string() == b.to_string(),
        _ => false,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn cached_execution_matches_canonical(actions in prop::collection::vec(action_strategy(), 1..120)) {
        let world = World::new();
        let cached_sites = world.sites();
        let plain_sites = world.sites();
        let mut cached = vm_with(ShadowConfig {
            polymorphic_size: 2,
            miss_threshold: 8,
            ..ShadowConfig::default()
        });
        let mut plain = vm_with(ShadowConfig {
            enabled: false,
            ..ShadowConfig::default()
        });

        for action in &actions {
            if let Action::Call(site, r) = action {
                // 写入调用点对两边写入同一个值，先后执行结果一致
                let receiver = world.receivers[*r].clone();
                let got = run_site(&mut cached, &cached_sites, site, receiver.clone());
                let want = run_site(&mut plain, &plain_sites, site, receiver);
                prop_assert!(
                    same_outcome(&got, &want),
                    "{:?}: cached {:?}, canonical {:?}",
                    action,
                    got,
                    want
                );
            } else {
                world.mutate(action);
            }
        }
        prop_assert!(!plain_sites.load.has_shadow());
        prop_assert!(!plain_sites.store.has_shadow());
    }

    #[test]
    fn repeated_calls_are_stable(receiver in 0..RECEIVERS, calls in 1usize..12) {
        let world = World::new();
        let sites = world.sites();
        let mut vm = VM::new();
        for site in [Site::Load, Site::Method] {
            let first = run_site(&mut vm, &sites, &site, world.receivers[receiver].clone());
            for _ in 0..calls {
                let again = run_site(&mut vm, &sites, &site, world.receivers[receiver].clone());
                prop_assert!(same_outcome(&again, &first));
            }
        }
    }
}
