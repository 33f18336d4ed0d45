// ABOUTME: Value types representing PTC-Lisp data and runtime callables

use crate::analyzer::FnDef;
use crate::env::Env;
use crate::error::LispError;
use crate::eval::Interp;
use indexmap::{IndexMap, IndexSet};
use serde::ser::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Native function signature. Builtins receive the interpreter so that
/// higher-order functions can apply closures and so the print/tool side
/// channels are reachable.
pub type NativeFn = fn(&mut Interp, &[Value]) -> Result<Value, LispError>;

/// Arity kind of a builtin, enforced centrally at call dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Normal(usize),
    Variadic,
    VariadicNonEmpty,
    MultiArity(&'static [usize]),
}

/// A registered native function.
#[derive(Debug)]
pub struct BuiltinDef {
    pub name: &'static str,
    pub kind: BuiltinKind,
    pub func: NativeFn,
}

/// A user function value. Captures the lexical environment by value plus a
/// snapshot of the user namespace at creation time, so helpers defined
/// alongside it stay reachable when the closure is invoked standalone.
#[derive(Debug, Clone)]
pub struct Closure {
    pub def: Arc<FnDef>,
    pub env: Env,
    pub ns_snapshot: Arc<IndexMap<String, Value>>,
}

impl Closure {
    pub fn name(&self) -> Option<&str> {
        self.def.name.as_deref()
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Keyword(String),
    Symbol(String),
    Vector(Vec<Value>),
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
    Closure(Arc<Closure>),
    Builtin(&'static BuiltinDef),
    /// Late-bound reference to a namespace entry (e.g. `tool/search`).
    Var(String),
    /// Control value produced by `(return v)`; short-circuits to the top.
    Return(Box<Value>),
    /// Control value produced by `(fail m)`; short-circuits to the top.
    Fail(Box<Value>),
    /// Control value produced by `(recur ...)`; consumed by `loop`/`fn`.
    Recur(Vec<Value>),
}

/// Normalize a float for hashing/equality: -0.0 collapses to 0.0 so that
/// keys that compare equal as f64 hash identically.
fn float_bits(f: f64) -> u64 {
    if f == 0.0 {
        0f64.to_bits()
    } else {
        f.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => float_bits(*a) == float_bits(*b),
            (String(a), String(b)) => a == b,
            (Keyword(a), Keyword(b)) => a == b,
            (Symbol(a), Symbol(b)) => a == b,
            (Vector(a), Vector(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Set(a), Set(b)) => a == b,
            (Closure(a), Closure(b)) => Arc::ptr_eq(a, b),
            (Builtin(a), Builtin(b)) => a.name == b.name,
            (Var(a), Var(b)) => a == b,
            (Return(a), Return(b)) => a == b,
            (Fail(a), Fail(b)) => a == b,
            (Recur(a), Recur(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Value::*;
        match self {
            Nil => state.write_u8(0),
            Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Int(i) => {
                state.write_u8(2);
                i.hash(state);
            }
            Float(f) => {
                state.write_u8(3);
                state.write_u64(float_bits(*f));
            }
            String(s) => {
                state.write_u8(4);
                s.hash(state);
            }
            Keyword(k) => {
                state.write_u8(5);
                k.hash(state);
            }
            Symbol(s) => {
                state.write_u8(6);
                s.hash(state);
            }
            Vector(items) => {
                state.write_u8(7);
                for item in items {
                    item.hash(state);
                }
            }
            // Maps and sets compare order-insensitively, so their hashes
            // must combine entry hashes commutatively.
            Map(m) => {
                state.write_u8(8);
                let mut acc: u64 = 0;
                for (k, v) in m {
                    let mut h = std::collections::hash_map::DefaultHasher::new();
                    k.hash(&mut h);
                    v.hash(&mut h);
                    acc = acc.wrapping_add(h.finish());
                }
                state.write_u64(acc);
            }
            Set(s) => {
                state.write_u8(9);
                let mut acc: u64 = 0;
                for v in s {
                    let mut h = std::collections::hash_map::DefaultHasher::new();
                    v.hash(&mut h);
                    acc = acc.wrapping_add(h.finish());
                }
                state.write_u64(acc);
            }
            Closure(c) => {
                state.write_u8(10);
                state.write_usize(Arc::as_ptr(c) as usize);
            }
            Builtin(def) => {
                state.write_u8(11);
                def.name.hash(state);
            }
            Var(name) => {
                state.write_u8(12);
                name.hash(state);
            }
            Return(v) => {
                state.write_u8(13);
                v.hash(state);
            }
            Fail(v) => {
                state.write_u8(14);
                v.hash(state);
            }
            Recur(vs) => {
                state.write_u8(15);
                for v in vs {
                    v.hash(state);
                }
            }
        }
    }
}

impl Value {
    /// Only `nil` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Control values that short-circuit every enclosing form.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Value::Return(_) | Value::Fail(_) | Value::Recur(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Keyword(_) => "keyword",
            Value::Symbol(_) => "symbol",
            Value::Vector(_) => "vector",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Closure(_) => "function",
            Value::Builtin(_) => "function",
            Value::Var(_) => "var",
            Value::Return(_) => "return",
            Value::Fail(_) => "fail",
            Value::Recur(_) => "recur",
        }
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn keyword(s: impl Into<String>) -> Value {
        Value::Keyword(s.into())
    }

    /// Render for user-facing output (`str`, `println`): strings bare,
    /// everything else as the canonical printer.
    pub fn display_string(&self) -> String {
        let mut out = String::new();
        write_value(&mut out, self, false);
        out
    }

    /// Canonical printed form; `parse(print(v)) == v` for data values.
    pub fn print_string(&self) -> String {
        let mut out = String::new();
        write_value(&mut out, self, true);
        out
    }

    /// Canonical form cut to a character budget with a trailing ellipsis.
    pub fn truncated(&self, max_chars: usize) -> String {
        let full = self.print_string();
        if full.chars().count() <= max_chars {
            return full;
        }
        let mut cut: String = full.chars().take(max_chars).collect();
        cut.push('…');
        cut
    }

    /// Shallow machine-independent cost estimate used by the heap ceiling.
    pub fn heap_cost(&self) -> usize {
        match self {
            Value::String(s) | Value::Keyword(s) | Value::Symbol(s) | Value::Var(s) => {
                24 + s.len()
            }
            Value::Vector(items) => 24 + 16 * items.len(),
            Value::Map(m) => 48 + 64 * m.len(),
            Value::Set(s) => 48 + 32 * s.len(),
            Value::Closure(_) => 128,
            _ => 16,
        }
    }

    /// Recursive cost, used when shaping final results and memory.
    pub fn deep_cost(&self) -> usize {
        match self {
            Value::Vector(items) => 24 + items.iter().map(Value::deep_cost).sum::<usize>(),
            Value::Map(m) => {
                48 + m
                    .iter()
                    .map(|(k, v)| k.deep_cost() + v.deep_cost())
                    .sum::<usize>()
            }
            Value::Set(s) => 48 + s.iter().map(Value::deep_cost).sum::<usize>(),
            Value::Return(v) | Value::Fail(v) => v.deep_cost(),
            other => other.heap_cost(),
        }
    }

    /// Build from host JSON. Object keys become keywords; programs can read
    /// either spelling through the flexible-key lookups.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Vector(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(obj) => {
                let mut map = IndexMap::new();
                for (k, v) in obj {
                    map.insert(Value::Keyword(k.clone()), Value::from_json(v));
                }
                Value::Map(map)
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Nil => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Keyword(k) | Value::Symbol(k) | Value::Var(k) => {
                serde_json::Value::String(k.clone())
            }
            Value::Vector(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Set(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(m) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in m {
                    let key = match k {
                        Value::Keyword(s) | Value::String(s) | Value::Symbol(s) => s.clone(),
                        other => other.print_string(),
                    };
                    obj.insert(key, v.to_json());
                }
                serde_json::Value::Object(obj)
            }
            Value::Return(v) | Value::Fail(v) => v.to_json(),
            other => serde_json::Value::String(other.print_string()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// The keyword/string twin of a map key, if it has one.
pub fn flex_twin(key: &Value) -> Option<Value> {
    match key {
        Value::Keyword(k) => Some(Value::String(k.clone())),
        Value::String(s) => Some(Value::Keyword(s.clone())),
        _ => None,
    }
}

/// Lookup that treats a string key and a keyword key as equivalent: the
/// literal key wins, then the coerced form. Writes never coerce.
pub fn flex_lookup<'a>(map: &'a IndexMap<Value, Value>, key: &Value) -> Option<&'a Value> {
    if let Some(v) = map.get(key) {
        return Some(v);
    }
    flex_twin(key).and_then(|twin| map.get(&twin))
}

pub fn flex_contains(map: &IndexMap<Value, Value>, key: &Value) -> bool {
    flex_lookup(map, key).is_some()
}

fn write_value(out: &mut String, value: &Value, readably: bool) {
    match value {
        Value::Nil => out.push_str("nil"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Int(i) => out.push_str(&i.to_string()),
        // {:?} keeps the decimal point so floats re-read as floats
        Value::Float(f) => out.push_str(&format!("{:?}", f)),
        Value::String(s) => {
            if readably {
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        '\r' => out.push_str("\\r"),
                        other => out.push(other),
                    }
                }
                out.push('"');
            } else {
                out.push_str(s);
            }
        }
        Value::Keyword(k) => {
            out.push(':');
            out.push_str(k);
        }
        Value::Symbol(s) => out.push_str(s),
        Value::Vector(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(out, item, readably);
            }
            out.push(']');
        }
        Value::Map(m) => {
            out.push('{');
            for (i, (k, v)) in m.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, k, readably);
                out.push(' ');
                write_value(out, v, readably);
            }
            out.push('}');
        }
        Value::Set(s) => {
            out.push_str("#{");
            for (i, v) in s.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(out, v, readably);
            }
            out.push('}');
        }
        Value::Closure(c) => match c.name() {
            Some(name) => out.push_str(&format!("#<fn {}>", name)),
            None => out.push_str("#<fn>"),
        },
        Value::Builtin(def) => out.push_str(&format!("#<builtin {}>", def.name)),
        Value::Var(name) => {
            out.push_str("#'");
            out.push_str(name);
        }
        Value::Return(v) => {
            out.push_str("#<return ");
            write_value(out, v, readably);
            out.push('>');
        }
        Value::Fail(v) => {
            out.push_str("#<fail ");
            write_value(out, v, readably);
            out.push('>');
        }
        Value::Recur(_) => out.push_str("#<recur>"),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.print_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(entries: Vec<(Value, Value)>) -> Value {
        Value::Map(entries.into_iter().collect())
    }

    #[test]
    fn test_display_scalars() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::keyword("name").to_string(), ":name");
        assert_eq!(Value::string("hi").to_string(), "\"hi\"");
    }

    #[test]
    fn test_display_collections() {
        let v = Value::Vector(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(v.to_string(), "[1 2]");

        let m = map_of(vec![
            (Value::keyword("a"), Value::Int(1)),
            (Value::keyword("b"), Value::Int(2)),
        ]);
        assert_eq!(m.to_string(), "{:a 1, :b 2}");
    }

    #[test]
    fn test_display_string_is_bare() {
        assert_eq!(Value::string("hi").display_string(), "hi");
        assert_eq!(
            Value::Vector(vec![Value::string("a")]).display_string(),
            "[\"a\"]"
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::string("").is_truthy());
        assert!(Value::Vector(vec![]).is_truthy());
        assert!(Value::Map(IndexMap::new()).is_truthy());
    }

    #[test]
    fn test_keyword_and_string_keys_differ() {
        let a = map_of(vec![(Value::keyword("k"), Value::Int(1))]);
        let b = map_of(vec![(Value::string("k"), Value::Int(1))]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_flex_lookup() {
        let m = match map_of(vec![(Value::string("k"), Value::Int(1))]) {
            Value::Map(m) => m,
            _ => unreachable!(),
        };
        assert_eq!(flex_lookup(&m, &Value::keyword("k")), Some(&Value::Int(1)));
        assert_eq!(flex_lookup(&m, &Value::string("k")), Some(&Value::Int(1)));
        assert_eq!(flex_lookup(&m, &Value::keyword("z")), None);
    }

    #[test]
    fn test_map_equality_ignores_order() {
        let a = map_of(vec![
            (Value::keyword("a"), Value::Int(1)),
            (Value::keyword("b"), Value::Int(2)),
        ]);
        let b = map_of(vec![
            (Value::keyword("b"), Value::Int(2)),
            (Value::keyword("a"), Value::Int(1)),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_json_round_trip() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"price": 100, "tags": ["a", "b"], "rate": 0.5}"#).unwrap();
        let v = Value::from_json(&json);
        match &v {
            Value::Map(m) => {
                assert_eq!(
                    flex_lookup(m, &Value::keyword("price")),
                    Some(&Value::Int(100))
                );
                assert_eq!(
                    flex_lookup(m, &Value::keyword("rate")),
                    Some(&Value::Float(0.5))
                );
            }
            other => panic!("expected map, got {}", other),
        }
        assert_eq!(v.to_json(), json);
    }

    #[test]
    fn test_negative_zero_hashes_like_zero() {
        let mut m = IndexMap::new();
        m.insert(Value::Float(0.0), Value::Int(1));
        assert_eq!(m.get(&Value::Float(-0.0)), Some(&Value::Int(1)));
    }
}
