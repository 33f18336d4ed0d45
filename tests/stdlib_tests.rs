// ABOUTME: Runtime library tests exercising builtin combinations through
// the public compile + execute pipeline

use indexmap::IndexMap;
use ptc_lisp::{compile, execute, SandboxOptions, ToolSet, Value};

fn v(src: &str) -> Value {
    ptc_lisp::analyzer::form_to_value(&ptc_lisp::parser::parse_one(src).unwrap())
}

fn eval_src(src: &str) -> Value {
    let program = compile(src).expect("compile failed");
    execute(
        &program,
        &IndexMap::new(),
        &IndexMap::new(),
        &[],
        None,
        &ToolSet::new(),
        &SandboxOptions::default(),
    )
    .expect("execution failed")
    .value
}

fn eval_err(src: &str) -> ptc_lisp::LispError {
    let program = match compile(src) {
        Ok(p) => p,
        Err(e) => return e,
    };
    execute(
        &program,
        &IndexMap::new(),
        &IndexMap::new(),
        &[],
        None,
        &ToolSet::new(),
        &SandboxOptions::default(),
    )
    .expect_err("expected an error")
}

#[test]
fn test_order_report_pipeline() {
    let src = r#"
        (let [orders [{:id 1 :total 120.0 :status "open"}
                      {:id 2 :total 80.0  :status "delivered"}
                      {:id 3 :total 220.0 :status "delivered"}]]
          {:delivered (count (filter (where :status = "delivered") orders))
           :revenue   (sum-by :total (filter (where :status = "delivered") orders))
           :largest   (:id (max-by :total orders))})
    "#;
    assert_eq!(
        eval_src(src),
        v("{:delivered 2, :revenue 300.0, :largest 3}")
    );
}

#[test]
fn test_group_and_aggregate() {
    let src = r#"
        (let [groups (group-by :cat [{:cat :a :n 1} {:cat :b :n 2} {:cat :a :n 3}])]
          (update-vals groups (fn [xs] (sum-by :n xs))))
    "#;
    assert_eq!(eval_src(src), v("{:a 4, :b 2}"));
}

#[test]
fn test_string_pipeline() {
    let src = r#"
        (->> (split-lines "alpha\nBETA\n  gamma ")
             (map trim)
             (map lower-case)
             (filter (fn [s] (starts-with? s "g"))))
    "#;
    assert_eq!(eval_src(src), v("[\"gamma\"]"));
}

#[test]
fn test_regex_extraction() {
    let src = r#"(re-seq "[a-z]+@[a-z.]+" "mail bob@x.io and eve@y.org now")"#;
    assert_eq!(eval_src(src), v("[\"bob@x.io\" \"eve@y.org\"]"));
}

#[test]
fn test_nested_map_updates() {
    let src = r#"
        (-> {:user {:name "ada" :visits 1}}
            (update-in [:user :visits] inc)
            (assoc-in [:user :tags] [:admin])
            (get :user))
    "#;
    assert_eq!(eval_src(src), v("{:name \"ada\", :visits 2, :tags [:admin]}"));
}

#[test]
fn test_set_algebra() {
    let src = r#"
        (let [a #{:x :y :z} b #{:y :z :w}]
          {:both (intersection a b)
           :only-a (difference a b)
           :all (union a b)})
    "#;
    assert_eq!(
        eval_src(src),
        v("{:both #{:y :z}, :only-a #{:x}, :all #{:x :y :z :w}}")
    );
}

#[test]
fn test_sort_and_partition() {
    assert_eq!(
        eval_src("(partition 2 (sort [4 1 3 2]))"),
        v("[[1 2] [3 4]]")
    );
    assert_eq!(
        eval_src("(sort-by :age [{:age 30} {:age 20}])"),
        v("[{:age 20} {:age 30}]")
    );
}

#[test]
fn test_frequencies_and_distinct() {
    assert_eq!(
        eval_src("(frequencies (map :k [{:k :a} {:k :b} {:k :a}]))"),
        v("{:a 2, :b 1}")
    );
    assert_eq!(eval_src("(distinct [3 1 3 2 1])"), v("[3 1 2]"));
}

#[test]
fn test_loop_based_fibonacci() {
    let src = r#"
        (loop [n 10 a 0 b 1]
          (if (= n 0) a (recur (dec n) b (+ a b))))
    "#;
    assert_eq!(eval_src(src), Value::Int(55));
}

#[test]
fn test_destructured_let_with_defaults() {
    let src = r#"
        (let [{:keys [host port] :or {port 8080}} {:host "db.local"}]
          (str host ":" port))
    "#;
    assert_eq!(eval_src(src), v("\"db.local:8080\""));
}

#[test]
fn test_keyword_shorthand_everywhere() {
    assert_eq!(eval_src("(map :id [{:id 1} {:id 2}])"), v("[1 2]"));
    assert_eq!(eval_src("(some :err [{:ok 1} {:err :boom}])"), v(":boom"));
    assert_eq!(eval_src("(sort-by :n [{:n 2} {:n 1}])"), v("[{:n 1} {:n 2}]"));
}

#[test]
fn test_arity_errors_carry_function_names() {
    let err = eval_err("(count [1] [2])");
    assert_eq!(err.to_string(), "count: expected 1 argument, got 2");
    assert_eq!(err.kind(), ptc_lisp::ErrorKind::ArityError);
}

#[test]
fn test_type_errors_carry_positions() {
    let err = eval_err("(+ 1 \"x\")");
    assert_eq!(err.to_string(), "+: expected number, got string at argument 2");
    assert_eq!(err.kind(), ptc_lisp::ErrorKind::TypeError);
}

#[test]
fn test_not_callable_kind() {
    let err = eval_err("(42 1)");
    assert_eq!(err.kind(), ptc_lisp::ErrorKind::NotCallable);
}

#[test]
fn test_unbound_symbol_kind() {
    let err = eval_err("(frobnicate 1)");
    assert_eq!(err.kind(), ptc_lisp::ErrorKind::AnalysisError);
}
