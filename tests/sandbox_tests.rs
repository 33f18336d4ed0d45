// ABOUTME: Sandbox resource-limit tests: wall-clock timeout, heap ceiling,
// loop limit. Timing-sensitive cases run serially.

use indexmap::IndexMap;
use ptc_lisp::{compile, execute, ErrorKind, SandboxOptions, SimpleExecutor, ToolSet, Value};
use serial_test::serial;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn opts_with_timeout(ms: u64) -> SandboxOptions {
    SandboxOptions {
        timeout: Duration::from_millis(ms),
        ..Default::default()
    }
}

fn sleeping_executor(ms: u64) -> Arc<SimpleExecutor> {
    Arc::new(SimpleExecutor::new().register("sleep", move |_args| {
        std::thread::sleep(Duration::from_millis(ms));
        Ok(Value::Nil)
    }))
}

#[test]
#[serial]
fn test_timeout_on_blocking_tool() {
    let program = compile("(tool/sleep {})").unwrap();
    let started = Instant::now();
    let err = execute(
        &program,
        &IndexMap::new(),
        &IndexMap::new(),
        &[],
        Some(sleeping_executor(400)),
        &ToolSet::new(),
        &opts_with_timeout(50),
    )
    .unwrap_err();
    let elapsed = started.elapsed();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    // timeout plus the small grace window, well before the tool finishes
    assert!(elapsed < Duration::from_millis(300), "took {:?}", elapsed);
}

#[test]
#[serial]
fn test_timeout_error_names_the_budget() {
    let program = compile("(tool/sleep {})").unwrap();
    let err = execute(
        &program,
        &IndexMap::new(),
        &IndexMap::new(),
        &[],
        Some(sleeping_executor(300)),
        &ToolSet::new(),
        &opts_with_timeout(50),
    )
    .unwrap_err();
    assert!(matches!(err, ptc_lisp::LispError::Timeout { ms: 50 }));
}

#[test]
#[serial]
fn test_deadline_interrupts_busy_loop() {
    // a busy evaluator loop trips the cooperative deadline check
    let program = compile("(loop [i 0] (recur (inc i)))").unwrap();
    let opts = SandboxOptions {
        timeout: Duration::from_millis(50),
        loop_limit: 10_000_000, // force the timeout path, not the loop limit
        ..Default::default()
    };
    let started = Instant::now();
    let err = execute(
        &program,
        &IndexMap::new(),
        &IndexMap::new(),
        &[],
        None,
        &ToolSet::new(),
        &opts,
    )
    .unwrap_err();
    // loop_limit is clamped to its hard maximum, so either guard may fire
    assert!(
        matches!(err.kind(), ErrorKind::Timeout | ErrorKind::LoopLimitExceeded),
        "unexpected {:?}",
        err
    );
    assert!(started.elapsed() < Duration::from_millis(300));
}

#[test]
fn test_loop_limit_exceeded() {
    let program = compile("(loop [i 0] (recur (inc i)))").unwrap();
    let err = execute(
        &program,
        &IndexMap::new(),
        &IndexMap::new(),
        &[],
        None,
        &ToolSet::new(),
        &SandboxOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LoopLimitExceeded);
    assert!(err.to_string().contains("1000"));
}

#[test]
fn test_heap_ceiling() {
    let src = "(loop [i 0 acc []] (recur (inc i) (conj acc \"xxxxxxxxxxxxxxxx\")))";
    let program = compile(src).unwrap();
    let opts = SandboxOptions {
        heap_limit: 8 * 1024,
        loop_limit: 10_000,
        ..Default::default()
    };
    let err = execute(
        &program,
        &IndexMap::new(),
        &IndexMap::new(),
        &[],
        None,
        &ToolSet::new(),
        &opts,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MemoryExceeded);
}

#[test]
fn test_partial_logs_dropped_on_abort() {
    // prints recorded before the error never surface on the error path
    let src = "(do (println \"about to blow\") (loop [i 0] (recur (inc i))))";
    let program = compile(src).unwrap();
    let result = execute(
        &program,
        &IndexMap::new(),
        &IndexMap::new(),
        &[],
        None,
        &ToolSet::new(),
        &SandboxOptions::default(),
    );
    assert!(result.is_err());
}

#[test]
fn test_print_cap_truncates_with_ellipsis() {
    let src = "(do (println (str-join (map (constantly \"x\") (range 100)))) 1)";
    let program = compile(src).unwrap();
    let opts = SandboxOptions {
        print_limit: 10,
        ..Default::default()
    };
    let out = execute(
        &program,
        &IndexMap::new(),
        &IndexMap::new(),
        &[],
        None,
        &ToolSet::new(),
        &opts,
    )
    .unwrap();
    assert_eq!(out.prints.len(), 1);
    assert_eq!(out.prints[0], "xxxxxxxxxx…");
}

#[test]
fn test_metrics_reported() {
    let program = compile("(reduce + (range 100))").unwrap();
    let out = execute(
        &program,
        &IndexMap::new(),
        &IndexMap::new(),
        &[],
        None,
        &ToolSet::new(),
        &SandboxOptions::default(),
    )
    .unwrap();
    assert_eq!(out.value, Value::Int(4950));
    assert!(out.metrics.iterations > 0);
    assert!(out.metrics.heap_bytes > 0);
}

#[test]
fn test_tool_errors_are_recorded_and_surfaced() {
    let executor: Arc<SimpleExecutor> = Arc::new(
        SimpleExecutor::new().register("flaky", |_| Err("backend unavailable".to_string())),
    );
    let program = compile("(tool/flaky {})").unwrap();
    let err = execute(
        &program,
        &IndexMap::new(),
        &IndexMap::new(),
        &[],
        Some(executor),
        &ToolSet::new(),
        &SandboxOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ToolError);
    assert!(err.to_string().contains("backend unavailable"));
}
