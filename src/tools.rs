// ABOUTME: Host tool integration: executor trait, tool declarations, call records

use crate::signature::{render_type, Signature};
use crate::value::Value;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A host tool callable from Lisp via `tool/<name>`.
///
/// Implementations must not panic through the sandbox boundary: anything
/// recoverable should be an `Err` message (recorded on the call log) or a
/// `nil` value for soft misses such as "not found".
pub trait ToolExecutor: Send + Sync {
    fn execute(&self, name: &str, args: &Value) -> Result<Value, String>;
}

/// Declared interface of one tool, rendered into the tool inventory and used
/// to shape positional call arguments.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: String,
    pub signature: Signature,
    pub description: String,
}

impl ToolDef {
    /// One inventory line: `tool/name(p :t, …) -> R  ; description`.
    pub fn inventory_line(&self) -> String {
        let params: Vec<String> = self
            .signature
            .params
            .iter()
            .map(|(n, t)| format!("{} {}", n, render_type(t)))
            .collect();
        let mut line = format!(
            "tool/{}({}) -> {}",
            self.name,
            params.join(", "),
            render_type(&self.signature.ret)
        );
        if !self.description.is_empty() {
            line.push_str("  ; ");
            line.push_str(&self.description);
        }
        line
    }
}

/// The read-only tool map shared by the sandbox and the agent loop.
pub type ToolSet = IndexMap<String, ToolDef>;

/// Shape Lisp call arguments into the executor's argument map.
///
/// A single map argument passes through unchanged. Otherwise positional
/// arguments are zipped against the declared parameter names; without a
/// declaration they fall back to `arg0..argN`.
pub fn shape_args(def: Option<&ToolDef>, args: &[Value]) -> Value {
    if args.len() == 1 {
        if let Value::Map(_) = &args[0] {
            return args[0].clone();
        }
    }
    let mut map = IndexMap::new();
    match def {
        Some(def) if def.signature.params.len() >= args.len() => {
            for ((name, _), value) in def.signature.params.iter().zip(args.iter()) {
                map.insert(Value::Keyword(name.clone()), value.clone());
            }
        }
        _ => {
            for (i, value) in args.iter().enumerate() {
                map.insert(Value::Keyword(format!("arg{}", i)), value.clone());
            }
        }
    }
    Value::Map(map)
}

/// One entry of the per-execution tool-call log.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub args: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

type ToolFn = dyn Fn(&Value) -> Result<Value, String> + Send + Sync;

/// Executor backed by a name → function table. The common host shape, and
/// what the test suites use.
#[derive(Default, Clone)]
pub struct SimpleExecutor {
    tools: HashMap<String, Arc<ToolFn>>,
}

impl SimpleExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.tools.insert(name.to_string(), Arc::new(f));
        self
    }
}

impl ToolExecutor for SimpleExecutor {
    fn execute(&self, name: &str, args: &Value) -> Result<Value, String> {
        match self.tools.get(name) {
            Some(f) => f(args),
            None => Err(format!("unknown tool '{}'", name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::parse_signature;

    fn def(sig: &str) -> ToolDef {
        ToolDef {
            name: "lookup".into(),
            signature: parse_signature(sig).unwrap(),
            description: "Find a record by id".into(),
        }
    }

    #[test]
    fn test_inventory_line() {
        let d = def("(id :string) -> {found :bool}");
        assert_eq!(
            d.inventory_line(),
            "tool/lookup(id :string) -> {found :bool}  ; Find a record by id"
        );
    }

    #[test]
    fn test_shape_args_single_map_passthrough() {
        let d = def("(id :string) -> :any");
        let arg = crate::analyzer::form_to_value(&crate::parser::parse_one("{:id \"x\"}").unwrap());
        assert_eq!(shape_args(Some(&d), &[arg.clone()]), arg);
    }

    #[test]
    fn test_shape_args_zips_param_names() {
        let d = def("(id :string, limit :int) -> :any");
        let shaped = shape_args(Some(&d), &[Value::string("x"), Value::Int(5)]);
        match shaped {
            Value::Map(m) => {
                assert_eq!(m.get(&Value::keyword("id")), Some(&Value::string("x")));
                assert_eq!(m.get(&Value::keyword("limit")), Some(&Value::Int(5)));
            }
            other => panic!("expected map, got {}", other),
        }
    }

    #[test]
    fn test_shape_args_positional_fallback() {
        let shaped = shape_args(None, &[Value::Int(1), Value::Int(2)]);
        match shaped {
            Value::Map(m) => {
                assert_eq!(m.get(&Value::keyword("arg0")), Some(&Value::Int(1)));
                assert_eq!(m.get(&Value::keyword("arg1")), Some(&Value::Int(2)));
            }
            other => panic!("expected map, got {}", other),
        }
    }

    #[test]
    fn test_simple_executor_dispatch() {
        let exec = SimpleExecutor::new().register("echo", |args| Ok(args.clone()));
        let args = Value::Map(IndexMap::new());
        assert_eq!(exec.execute("echo", &args).unwrap(), args);
        assert!(exec.execute("missing", &args).is_err());
    }
}
