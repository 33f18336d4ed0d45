//! Concurrency: pmap
//!
//! `pmap` evaluates `f` over the collection on scoped worker threads. The
//! result preserves input order, the first failure or sentinel propagates,
//! and worker print/tool-call logs merge back into the main log by input
//! index, never by completion time. Each item is bounded by `pmap_timeout`
//! on top of the program deadline.

use super::seq_items;
use crate::error::LispError;
use crate::eval::Interp;
use crate::tools::ToolCallRecord;
use crate::value::Value;
use ptc_macros::builtin;
use std::time::Instant;

type WorkerOutput = (
    Result<Value, LispError>,
    Vec<String>,
    Vec<ToolCallRecord>,
    usize,
);

#[builtin(name = "pmap", arity = 2)]
pub fn builtin_pmap(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let f = args[0].clone();
    let items = seq_items("pmap", &args[1], 2)?;
    if items.is_empty() {
        return Ok(Value::Vector(Vec::new()));
    }

    let item_deadline = Instant::now() + interp.opts.pmap_timeout;
    let mut outputs: Vec<WorkerOutput> = Vec::with_capacity(items.len());

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(items.len());
        for item in &items {
            let mut worker = interp.worker(item_deadline);
            let f = f.clone();
            let item = item.clone();
            handles.push(scope.spawn(move || {
                let result = worker.apply(&f, &[item]);
                (
                    result,
                    worker.take_prints(),
                    worker.take_tool_calls(),
                    worker.heap_used(),
                )
            }));
        }
        for handle in handles {
            // a panicking worker would be a runtime bug; surface it as such
            outputs.push(handle.join().unwrap_or_else(|_| {
                (
                    Err(LispError::runtime_error("pmap", "worker panicked")),
                    Vec::new(),
                    Vec::new(),
                    0,
                )
            }));
        }
    });

    let mut results = Vec::with_capacity(outputs.len());
    for (result, prints, calls, heap) in outputs {
        interp.absorb_worker(prints, calls);
        interp.charge(heap)?;
        match result {
            Ok(v) if v.is_sentinel() => return Ok(v),
            Ok(v) => results.push(v),
            Err(e) => return Err(e),
        }
    }
    let v = Value::Vector(results);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

pub fn register(table: &mut super::BuiltinTable) {
    register_builtin_pmap(table);
}
