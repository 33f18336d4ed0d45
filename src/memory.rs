// ABOUTME: Memory contract applied to a program's top-level return value
// Maps merge into memory (":result" extracts the answer); anything else
// leaves memory untouched. Float rounding happens at emit time only.

use crate::value::Value;
use indexmap::IndexMap;

/// Outcome of applying the contract to one program result.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryOutcome {
    pub return_value: Value,
    pub delta: IndexMap<String, Value>,
    pub memory: IndexMap<String, Value>,
}

fn key_name(key: &Value) -> String {
    match key {
        Value::Keyword(k) | Value::String(k) | Value::Symbol(k) => k.clone(),
        other => other.print_string(),
    }
}

fn is_result_key(key: &Value) -> bool {
    matches!(key, Value::Keyword(k) | Value::String(k) if k == "result")
}

/// Apply the top-level contract:
/// - non-map value: memory unchanged, empty delta
/// - map without `:result`: every entry merges into memory (right wins)
/// - map with `:result`: that entry is the return value, the rest is the delta
pub fn apply_contract(value: &Value, memory: &IndexMap<String, Value>) -> MemoryOutcome {
    let map = match value {
        Value::Map(m) => m,
        other => {
            return MemoryOutcome {
                return_value: other.clone(),
                delta: IndexMap::new(),
                memory: memory.clone(),
            }
        }
    };

    let result = map.iter().find(|(k, _)| is_result_key(k));
    let mut delta = IndexMap::new();
    for (k, v) in map {
        if is_result_key(k) {
            continue;
        }
        delta.insert(key_name(k), v.clone());
    }

    let mut merged = memory.clone();
    for (k, v) in &delta {
        merged.insert(k.clone(), v.clone());
    }

    MemoryOutcome {
        return_value: match result {
            Some((_, v)) => v.clone(),
            None => value.clone(),
        },
        delta,
        memory: merged,
    }
}

/// Recursively round every float to `precision` decimal places, preserving
/// map key order. Applied to emitted values only, never to stored memory.
pub fn round_floats(value: &Value, precision: u32) -> Value {
    let factor = 10f64.powi(precision as i32);
    round_with(value, factor)
}

fn round_with(value: &Value, factor: f64) -> Value {
    match value {
        Value::Float(f) => Value::Float((f * factor).round() / factor),
        Value::Vector(items) => {
            Value::Vector(items.iter().map(|v| round_with(v, factor)).collect())
        }
        Value::Map(m) => {
            let mut out = IndexMap::with_capacity(m.len());
            for (k, v) in m {
                out.insert(round_with(k, factor), round_with(v, factor));
            }
            Value::Map(out)
        }
        Value::Set(s) => Value::Set(s.iter().map(|v| round_with(v, factor)).collect()),
        Value::Return(v) => Value::Return(Box::new(round_with(v, factor))),
        Value::Fail(v) => Value::Fail(Box::new(round_with(v, factor))),
        other => other.clone(),
    }
}

/// Cost of the carried memory map, for the memory-limit check.
pub fn memory_cost(memory: &IndexMap<String, Value>) -> usize {
    memory
        .iter()
        .map(|(k, v)| 24 + k.len() + v.deep_cost())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(src: &str) -> Value {
        crate::analyzer::form_to_value(&crate::parser::parse_one(src).unwrap())
    }

    fn mem(entries: &[(&str, Value)]) -> IndexMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_non_map_leaves_memory_alone() {
        let memory = mem(&[("seen", Value::Int(1))]);
        let out = apply_contract(&Value::Int(42), &memory);
        assert_eq!(out.return_value, Value::Int(42));
        assert!(out.delta.is_empty());
        assert_eq!(out.memory, memory);
    }

    #[test]
    fn test_map_without_result_merges_all() {
        let memory = mem(&[("a", Value::Int(1))]);
        let out = apply_contract(&v("{:a 9, :b 2}"), &memory);
        assert_eq!(out.return_value, v("{:a 9, :b 2}"));
        assert_eq!(out.delta, mem(&[("a", Value::Int(9)), ("b", Value::Int(2))]));
        // right wins
        assert_eq!(out.memory.get("a"), Some(&Value::Int(9)));
        assert_eq!(out.memory.get("b"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_result_key_extracts_answer() {
        let out = apply_contract(&v("{:result 42, :note \"ok\"}"), &IndexMap::new());
        assert_eq!(out.return_value, Value::Int(42));
        assert_eq!(out.delta, mem(&[("note", v("\"ok\""))]));
        assert_eq!(out.memory.get("note"), Some(&v("\"ok\"")));
        assert!(out.memory.get("result").is_none());
    }

    #[test]
    fn test_string_result_key_also_extracts() {
        let out = apply_contract(&v("{\"result\" 1, \"note\" 2}"), &IndexMap::new());
        assert_eq!(out.return_value, Value::Int(1));
        assert_eq!(out.delta, mem(&[("note", Value::Int(2))]));
    }

    #[test]
    fn test_round_floats() {
        let rounded = round_floats(&v("{:rate 0.24567, :xs [1.005 2]}"), 2);
        assert_eq!(rounded, v("{:rate 0.25, :xs [1.0 2]}"));
    }

    #[test]
    fn test_rounding_preserves_key_order() {
        let rounded = round_floats(&v("{:b 1.119, :a 2.221}"), 2);
        match rounded {
            Value::Map(m) => {
                let keys: Vec<_> = m.keys().cloned().collect();
                assert_eq!(keys, vec![Value::keyword("b"), Value::keyword("a")]);
            }
            other => panic!("expected map, got {}", other),
        }
    }
}
