// ABOUTME: Isolated execution of one compiled program under hard limits
// A worker thread evaluates the program; the caller waits with a wall-clock
// budget. Abnormal termination delivers only the error, never partial logs.

use crate::config::{MemoryStrategy, SandboxOptions};
use crate::env::Env;
use crate::error::LispError;
use crate::eval::Interp;
use crate::memory::{apply_contract, memory_cost, round_floats};
use crate::tools::{ToolCallRecord, ToolExecutor, ToolSet};
use crate::value::Value;
use crate::Program;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Extra wait beyond the configured timeout before the caller gives up on
/// the worker; the evaluator's own deadline check normally fires first.
const GRACE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentinel {
    None,
    Return,
    Fail,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Metrics {
    pub duration_ms: u64,
    pub heap_bytes: usize,
    pub iterations: u64,
}

/// Result of one successful (non-aborted) program execution, already shaped
/// through the memory contract and float rounding.
#[derive(Debug, Clone)]
pub struct Execution {
    pub value: Value,
    pub fail: Option<Value>,
    pub sentinel: Sentinel,
    pub memory: IndexMap<String, Value>,
    pub memory_delta: IndexMap<String, Value>,
    /// set when the memory limit was breached under the rollback strategy
    pub memory_rolled_back: bool,
    pub prints: Vec<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub metrics: Metrics,
}

struct WorkerOutput {
    result: Result<Value, LispError>,
    prints: Vec<String>,
    tool_calls: Vec<ToolCallRecord>,
    heap: usize,
    iterations: u64,
}

/// Execute a compiled program in an isolated worker.
pub fn execute(
    program: &Program,
    ctx: &IndexMap<String, Value>,
    memory: &IndexMap<String, Value>,
    history: &[Value],
    executor: Option<Arc<dyn ToolExecutor>>,
    toolset: &ToolSet,
    opts: &SandboxOptions,
) -> Result<Execution, LispError> {
    let started = Instant::now();
    let deadline = started + opts.timeout;

    let (tx, rx) = crossbeam_channel::bounded::<WorkerOutput>(1);
    let ast = program.ast.clone();
    let ctx = ctx.clone();
    let starting_memory = memory.clone();
    let history = history.to_vec();
    let toolset = toolset.clone();
    let worker_opts = opts.clone();

    tracing::debug!(timeout_ms = opts.timeout.as_millis() as u64, "sandbox spawn");

    std::thread::spawn(move || {
        let mut interp = Interp::new(
            &ctx,
            &starting_memory,
            &history,
            executor.as_deref(),
            &toolset,
            &worker_opts,
            Some(deadline),
        );
        let result = interp.eval(&ast, &Env::new());
        let output = WorkerOutput {
            result,
            prints: interp.take_prints(),
            tool_calls: interp.take_tool_calls(),
            heap: interp.heap_used(),
            iterations: interp.iterations(),
        };
        // the receiver may have timed out and gone away
        let _ = tx.send(output);
    });

    let output = match rx.recv_timeout(opts.timeout + GRACE) {
        Ok(output) => output,
        Err(_) => {
            // worker is stuck in a blocking host call; abandon it
            tracing::warn!(
                timeout_ms = opts.timeout.as_millis() as u64,
                "sandbox worker abandoned on timeout"
            );
            return Err(LispError::Timeout {
                ms: opts.timeout.as_millis() as u64,
            });
        }
    };

    let metrics = Metrics {
        duration_ms: started.elapsed().as_millis() as u64,
        heap_bytes: output.heap,
        iterations: output.iterations,
    };

    let value = output.result?;
    shape(
        value,
        memory,
        output.prints,
        output.tool_calls,
        metrics,
        opts,
    )
}

/// Turn the raw evaluation result into an `Execution`: unwrap sentinels,
/// apply the memory contract and strategy, round floats at emit time.
fn shape(
    value: Value,
    starting_memory: &IndexMap<String, Value>,
    prints: Vec<String>,
    tool_calls: Vec<ToolCallRecord>,
    metrics: Metrics,
    opts: &SandboxOptions,
) -> Result<Execution, LispError> {
    match value {
        Value::Fail(payload) => Ok(Execution {
            value: Value::Nil,
            fail: Some(*payload),
            sentinel: Sentinel::Fail,
            memory: starting_memory.clone(),
            memory_delta: IndexMap::new(),
            memory_rolled_back: false,
            prints,
            tool_calls,
            metrics,
        }),
        other => {
            let (sentinel, raw) = match other {
                Value::Return(v) => (Sentinel::Return, *v),
                v => (Sentinel::None, v),
            };
            let outcome = apply_contract(&raw, starting_memory);
            let mut memory = outcome.memory;
            let mut delta = outcome.delta;
            let mut rolled_back = false;

            if let Some(limit) = opts.memory_limit {
                if memory_cost(&memory) > limit {
                    match opts.memory_strategy {
                        MemoryStrategy::Strict => {
                            return Err(LispError::MemoryExceeded {
                                bytes: memory_cost(&memory),
                            });
                        }
                        MemoryStrategy::Rollback => {
                            memory = starting_memory.clone();
                            delta = IndexMap::new();
                            rolled_back = true;
                        }
                    }
                }
            }

            let value = match opts.float_precision {
                Some(p) => round_floats(&outcome.return_value, p),
                None => outcome.return_value,
            };

            Ok(Execution {
                value,
                fail: None,
                sentinel,
                memory,
                memory_delta: delta,
                memory_rolled_back: rolled_back,
                prints,
                tool_calls,
                metrics,
            })
        }
    }
}
