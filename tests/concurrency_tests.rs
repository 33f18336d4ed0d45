// ABOUTME: pmap behavior: order preservation, sentinel propagation and
// deterministic merging of worker side-effect logs

use indexmap::IndexMap;
use ptc_lisp::{compile, execute, SandboxOptions, Sentinel, SimpleExecutor, ToolSet, Value};
use std::sync::Arc;
use std::time::Duration;

fn v(src: &str) -> Value {
    ptc_lisp::analyzer::form_to_value(&ptc_lisp::parser::parse_one(src).unwrap())
}

/// Tool that sleeps for `:ms` and then echoes `:tag`.
fn slow_executor() -> Arc<SimpleExecutor> {
    Arc::new(SimpleExecutor::new().register("slow", |args| {
        let (mut ms, mut tag) = (0i64, Value::Nil);
        if let Value::Map(m) = args {
            if let Some(Value::Int(n)) = m.get(&Value::keyword("ms")) {
                ms = *n;
            }
            if let Some(t) = m.get(&Value::keyword("tag")) {
                tag = t.clone();
            }
        }
        std::thread::sleep(Duration::from_millis(ms as u64));
        Ok(tag)
    }))
}

fn run_with_tools(src: &str, executor: Arc<SimpleExecutor>) -> ptc_lisp::Execution {
    let program = compile(src).expect("compile failed");
    execute(
        &program,
        &IndexMap::new(),
        &IndexMap::new(),
        &[],
        Some(executor),
        &ToolSet::new(),
        &SandboxOptions::default(),
    )
    .expect("execution failed")
}

#[test]
fn test_pmap_matches_mapv() {
    let program = compile("[(pmap inc [1 2 3 4]) (mapv inc [1 2 3 4])]").unwrap();
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
    match out.value {
        Value::Vector(both) => assert_eq!(both[0], both[1]),
        other => panic!("expected vector, got {}", other),
    }
}

#[test]
fn test_pmap_preserves_input_order_under_delays() {
    // the slowest item comes first; completion order inverts input order
    let src = r#"
        (pmap (fn [x] (tool/slow {:ms (:ms x) :tag (:tag x)}))
              [{:ms 60 :tag :a} {:ms 20 :tag :b} {:ms 0 :tag :c}])
    "#;
    let out = run_with_tools(src, slow_executor());
    assert_eq!(out.value, v("[:a :b :c]"));
}

#[test]
fn test_pmap_merges_tool_logs_by_input_index() {
    let src = r#"
        (pmap (fn [x] (tool/slow {:ms (:ms x) :tag (:tag x)}))
              [{:ms 40 :tag :first} {:ms 0 :tag :second}])
    "#;
    let out = run_with_tools(src, slow_executor());
    let tags: Vec<String> = out
        .tool_calls
        .iter()
        .map(|c| c.result.as_ref().unwrap().display_string())
        .collect();
    // merged by input index, not by completion time
    assert_eq!(tags, vec![":first", ":second"]);
}

#[test]
fn test_pmap_propagates_first_sentinel() {
    let program =
        compile("(pmap (fn [x] (if (= x 2) (return :found) x)) [1 2 3])").unwrap();
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
    assert_eq!(out.sentinel, Sentinel::Return);
    assert_eq!(out.value, v(":found"));
}

#[test]
fn test_pmap_propagates_first_failure() {
    let program = compile("(pmap (fn [x] (/ 1 x)) [1 0 2])").unwrap();
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
    assert_eq!(err.kind(), ptc_lisp::ErrorKind::TypeError);
}

#[test]
fn test_pmap_empty_collection() {
    let program = compile("(pmap inc [])").unwrap();
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
    assert_eq!(out.value, v("[]"));
}

#[test]
fn test_pmap_worker_prints_merge_in_order() {
    let program = compile("(pmap (fn [x] (do (println x) x)) [1 2 3])").unwrap();
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
    assert_eq!(out.prints, vec!["1", "2", "3"]);
}
