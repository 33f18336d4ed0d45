//! # Built-in Functions Module
//!
//! The PTC-Lisp runtime library, organized by category. Each sub-module
//! declares its functions with the `#[builtin]` attribute and exposes a
//! `register` function that inserts them into the shared table the analyzer
//! resolves bare symbols against.
//!
//! ## Categories
//!
//! - **[arithmetic]** — + - * / numeric tower, inc/dec/abs/mod/rem/min/max, range
//! - **[comparison]** — = not= != < <= > >=
//! - **[logic]** — not, where, all-of, any-of, none-of
//! - **[strings]** — str, split/join/trim/case, subs, re-find, re-seq
//! - **[lists]** — sequence ops and higher-order map/filter/reduce family
//! - **[maps]** — get/assoc/update/merge family with flexible key reads
//! - **[sets]** — set, union, intersection, difference
//! - **[types]** — type probes (nil?, number?, …)
//! - **[console]** — print, println (captured, bounded)
//! - **[concurrency]** — pmap
//! - **[control]** — return, fail

use crate::error::LispError;
use crate::eval::Interp;
use crate::value::{BuiltinDef, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::OnceLock;

pub mod arithmetic;
pub mod comparison;
pub mod concurrency;
pub mod console;
pub mod control;
pub mod lists;
pub mod logic;
pub mod maps;
pub mod sets;
pub mod strings;
pub mod types;

/// Name → definition table for all registered builtins.
#[derive(Default)]
pub struct BuiltinTable {
    map: HashMap<&'static str, &'static BuiltinDef>,
}

impl BuiltinTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, def: &'static BuiltinDef) {
        self.map.insert(def.name, def);
    }

    pub fn get(&self, name: &str) -> Option<&'static BuiltinDef> {
        self.map.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.map.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// The global builtin table, built once on first use.
pub fn table() -> &'static BuiltinTable {
    static TABLE: OnceLock<BuiltinTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = BuiltinTable::new();
        arithmetic::register(&mut table);
        comparison::register(&mut table);
        concurrency::register(&mut table);
        console::register(&mut table);
        control::register(&mut table);
        lists::register(&mut table);
        logic::register(&mut table);
        maps::register(&mut table);
        sets::register(&mut table);
        strings::register(&mut table);
        types::register(&mut table);
        table
    })
}

// ============================================================================
// Shared argument helpers
// ============================================================================

/// Numeric-tower-lite scalar: any float in a mix makes the result float.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    pub(crate) fn to_value(self) -> Value {
        match self {
            Num::Int(i) => Value::Int(i),
            Num::Float(f) => Value::Float(f),
        }
    }
}

pub(crate) fn as_num(function: &str, v: &Value, pos: usize) -> Result<Num, LispError> {
    match v {
        Value::Int(i) => Ok(Num::Int(*i)),
        Value::Float(f) => Ok(Num::Float(*f)),
        other => Err(LispError::type_error(function, "number", other, pos)),
    }
}

pub(crate) fn as_string<'v>(
    function: &str,
    v: &'v Value,
    pos: usize,
) -> Result<&'v str, LispError> {
    match v {
        Value::String(s) => Ok(s),
        other => Err(LispError::type_error(function, "string", other, pos)),
    }
}

pub(crate) fn as_int(function: &str, v: &Value, pos: usize) -> Result<i64, LispError> {
    match v {
        Value::Int(i) => Ok(*i),
        other => Err(LispError::type_error(function, "int", other, pos)),
    }
}

/// View any collection as an ordered item sequence. Map entries appear as
/// two-element `[k v]` vectors, the documented Clojure-compat choice.
pub(crate) fn seq_items(function: &str, v: &Value, pos: usize) -> Result<Vec<Value>, LispError> {
    match v {
        Value::Vector(items) => Ok(items.clone()),
        Value::Set(items) => Ok(items.iter().cloned().collect()),
        Value::Map(m) => Ok(m
            .iter()
            .map(|(k, v)| Value::Vector(vec![k.clone(), v.clone()]))
            .collect()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Nil => Ok(Vec::new()),
        other => Err(LispError::type_error(function, "collection", other, pos)),
    }
}

/// Default ordering used by `sort`, `sort-by`, `min-by`, `max-by`:
/// numbers cross-compare, otherwise values compare within their own type.
pub(crate) fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Keyword(x), Value::Keyword(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Vector(x), Value::Vector(y)) => {
            for (xa, ya) in x.iter().zip(y.iter()) {
                let ord = cmp_values(xa, ya);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => a.print_string().cmp(&b.print_string()),
    }
}

/// Apply a predicate/key function, propagating sentinels to the caller.
/// Returns `Err` on evaluation errors and `Ok(Err(sentinel))` when the
/// callee short-circuited.
pub(crate) fn call1(
    interp: &mut Interp,
    f: &Value,
    arg: Value,
) -> Result<Result<Value, Value>, LispError> {
    let out = interp.apply(f, &[arg])?;
    if out.is_sentinel() {
        Ok(Err(out))
    } else {
        Ok(Ok(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_core_builtins() {
        let t = table();
        for name in [
            "+", "-", "*", "/", "=", "not=", "count", "map", "filter", "reduce", "get", "assoc",
            "str", "println", "pmap", "return", "fail", "where", "union",
        ] {
            assert!(t.get(name).is_some(), "missing builtin {}", name);
        }
    }

    #[test]
    fn test_seq_items_on_map_yields_entry_pairs() {
        let mut m = indexmap::IndexMap::new();
        m.insert(Value::keyword("a"), Value::Int(1));
        let items = seq_items("test", &Value::Map(m), 1).unwrap();
        assert_eq!(
            items,
            vec![Value::Vector(vec![Value::keyword("a"), Value::Int(1)])]
        );
    }

    #[test]
    fn test_cmp_values_cross_numeric() {
        assert_eq!(cmp_values(&Value::Int(1), &Value::Float(1.5)), Ordering::Less);
        assert_eq!(
            cmp_values(&Value::Float(2.0), &Value::Int(2)),
            Ordering::Equal
        );
    }
}
