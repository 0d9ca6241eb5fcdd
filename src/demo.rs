//! Built-in demo workload
//!
//! 一段覆盖各类特化的小程序：槽位、共享键字典、方法、全局、
//! 常量下标、字典下标，以及中途出现的子类接收者（多态）。

use std::rc::Rc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::runtime::errors::RuntimeError;
use crate::runtime::object::{Module, TypeBuilder, TypeObject};
use crate::runtime::value::Value;
use crate::shadow::stats::{self, CacheStats};
use crate::util::config::ShadowConfig;
use crate::vm::code::{CodeBuilder, CodeObject};
use crate::vm::VM;

/// 演示结果
#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    pub iterations: usize,
    /// 每次调用的返回值
    pub values: Vec<i64>,
    pub stats: CacheStats,
}

/// 演示用的类型与模块
pub struct DemoWorld {
    pub module: Rc<Module>,
    pub point: Rc<TypeObject>,
    pub point3: Rc<TypeObject>,
    pub record: Rc<TypeObject>,
    pub code: CodeObject,
}

fn int_slot(
    args: &[Value],
    offset: usize,
) -> Result<i64, RuntimeError> {
    match args.first() {
        Some(Value::Instance(inst)) => match inst.slot_get(offset) {
            Some(Value::Int(i)) => Ok(i),
            _ => Ok(0),
        },
        _ => Err(RuntimeError::TypeError("expected an instance".to_string())),
    }
}

impl DemoWorld {
    pub fn new() -> Result<Self> {
        let module = Module::new("demo");
        module.set("SCALE", Value::Int(100));

        let point = TypeBuilder::new("Point")
            .slot("x")
            .slot("y")
            .no_dict()
            .method("norm1", |args| Ok(Value::Int(int_slot(args, 0)?.abs() + int_slot(args, 1)?.abs())))
            .build()
            .context("building Point")?;
        let point3 = TypeBuilder::new("Point3")
            .base(&point)
            .slot("z")
            .no_dict()
            .build()
            .context("building Point3")?;
        let record = TypeBuilder::new("Record").build().context("building Record")?;

        // def work(p, r, t, d):
        //     r.a = p.x
        //     return p.x + p.y + r.a + SCALE + t[1] + d["k"] + p.norm1()
        let code = CodeBuilder::new("work", &module)
            .locals(4)
            .load_fast(0)
            .load_attr("x")
            .load_fast(1)
            .store_attr("a")
            .load_fast(0)
            .load_attr("x")
            .load_fast(0)
            .load_attr("y")
            .binary_add()
            .load_fast(1)
            .load_attr("a")
            .binary_add()
            .load_global("SCALE")
            .binary_add()
            .load_fast(2)
            .load_const(Value::Int(1))
            .binary_subscr()
            .binary_add()
            .load_fast(3)
            .load_const(Value::str("k"))
            .binary_subscr()
            .binary_add()
            .load_fast(0)
            .load_method("norm1")
            .call_method(0)
            .binary_add()
            .return_value()
            .build();

        Ok(Self {
            module,
            point,
            point3,
            record,
            code,
        })
    }

    /// 构造第 `i` 次调用的参数
    pub fn args(
        &self,
        i: usize,
        polymorphic: bool,
    ) -> Result<Vec<Value>> {
        let ty = if polymorphic && i % 2 == 1 { &self.point3 } else { &self.point };
        let p = ty.instantiate();
        p.slot_set(0, Some(Value::Int(i as i64)));
        p.slot_set(1, Some(Value::Int(-1)));
        let r = self.record.instantiate();
        let t = Value::tuple(vec![Value::Int(0), Value::Int(7)]);
        let d = Value::dict(vec![(Value::str("k"), Value::Int(1000))])?;
        Ok(vec![Value::Instance(p), Value::Instance(r), t, d])
    }
}

/// 运行演示：前半段只用 `Point`，后半段交替 `Point` / `Point3`，并在中点修改全局
pub fn run_demo(
    config: ShadowConfig,
    iterations: usize,
) -> Result<DemoReport> {
    let world = DemoWorld::new()?;
    let mut vm = VM::new_with_config(config);
    stats::take();

    let mut values = Vec::with_capacity(iterations);
    for i in 0..iterations {
        if i == iterations / 2 {
            world.module.set("SCALE", Value::Int(200));
        }
        let args = world.args(i, i >= iterations / 2)?;
        let value = vm
            .run(&world.code, &args)
            .with_context(|| format!("iteration {}", i))?;
        match value {
            Value::Int(v) => values.push(v),
            other => anyhow::bail!("unexpected result {:?}", other),
        }
    }
    info!("demo finished after {} iterations", iterations);

    Ok(DemoReport {
        iterations,
        values,
        stats: stats::snapshot(),
    })
}

/// 不经过虚拟机计算第 `i` 次调用的期望值
pub fn expected_value(
    i: usize,
    iterations: usize,
) -> i64 {
    let x = i as i64;
    let scale = if i >= iterations / 2 { 200 } else { 100 };
    // p.x + p.y + r.a + SCALE + t[1] + d["k"] + norm1
    x + -1 + x + scale + 7 + 1000 + (x.abs() + 1)
}
