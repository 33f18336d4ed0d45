//! Map operations: get, get-in, assoc, update, merge, select-keys, dissoc…
//!
//! Reads apply the flexible keyword/string key equivalence; writes keep the
//! exact key the caller used (updates reuse the spelling already present).

use super::seq_items;
use crate::error::LispError;
use crate::eval::Interp;
use crate::value::{flex_contains, flex_lookup, flex_twin, Value};
use indexmap::IndexMap;
use ptc_macros::builtin;

/// The key to write through for an update: the literal key if present, the
/// existing twin if only that exists, otherwise the literal key.
fn write_key(map: &IndexMap<Value, Value>, key: &Value) -> Value {
    if map.contains_key(key) {
        return key.clone();
    }
    match flex_twin(key) {
        Some(twin) if map.contains_key(&twin) => twin,
        _ => key.clone(),
    }
}

fn lookup(coll: &Value, key: &Value, default: &Value) -> Value {
    match coll {
        Value::Map(m) => flex_lookup(m, key).cloned().unwrap_or_else(|| default.clone()),
        Value::Vector(items) => match key {
            Value::Int(i) if *i >= 0 => items
                .get(*i as usize)
                .cloned()
                .unwrap_or_else(|| default.clone()),
            _ => default.clone(),
        },
        Value::Set(s) => {
            if s.contains(key) {
                key.clone()
            } else {
                default.clone()
            }
        }
        _ => default.clone(),
    }
}

#[builtin(name = "get", arities(2, 3))]
pub fn builtin_get(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let default = args.get(2).cloned().unwrap_or(Value::Nil);
    Ok(lookup(&args[0], &args[1], &default))
}

#[builtin(name = "get-in", arities(2, 3))]
pub fn builtin_get_in(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let path = match &args[1] {
        Value::Vector(p) => p,
        other => return Err(LispError::type_error("get-in", "vector", other, 2)),
    };
    let default = args.get(2).cloned().unwrap_or(Value::Nil);
    let mut current = args[0].clone();
    for key in path {
        current = lookup(&current, key, &Value::Nil);
        if matches!(current, Value::Nil) {
            return Ok(default);
        }
    }
    Ok(current)
}

#[builtin(name = "assoc", variadic_nonempty)]
pub fn builtin_assoc(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    if args.len() < 3 || args.len() % 2 == 0 {
        return Err(LispError::arity_error("assoc", "odd count of at least 3", args.len()));
    }
    let mut out = match &args[0] {
        Value::Nil => Value::Map(IndexMap::new()),
        other => other.clone(),
    };
    for pair in args[1..].chunks(2) {
        match &mut out {
            Value::Map(m) => {
                m.insert(pair[0].clone(), pair[1].clone());
            }
            Value::Vector(items) => match &pair[0] {
                Value::Int(i) if *i >= 0 && (*i as usize) <= items.len() => {
                    let i = *i as usize;
                    if i == items.len() {
                        items.push(pair[1].clone());
                    } else {
                        items[i] = pair[1].clone();
                    }
                }
                other => {
                    return Err(LispError::runtime_error(
                        "assoc",
                        format!("index {} out of bounds", other),
                    ))
                }
            },
            other => return Err(LispError::type_error("assoc", "map or vector", other, 1)),
        }
    }
    interp.charge(out.heap_cost())?;
    Ok(out)
}

#[builtin(name = "assoc-in", arity = 3)]
pub fn builtin_assoc_in(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let path = match &args[1] {
        Value::Vector(p) if !p.is_empty() => p.clone(),
        Value::Vector(_) => {
            return Err(LispError::runtime_error("assoc-in", "empty path"))
        }
        other => return Err(LispError::type_error("assoc-in", "vector", other, 2)),
    };
    let out = assoc_path(&args[0], &path, args[2].clone())?;
    interp.charge(out.heap_cost())?;
    Ok(out)
}

fn assoc_path(target: &Value, path: &[Value], value: Value) -> Result<Value, LispError> {
    let key = &path[0];
    let new_value = if path.len() == 1 {
        value
    } else {
        let inner = lookup(target, key, &Value::Nil);
        assoc_path(&inner, &path[1..], value)?
    };
    match target {
        Value::Map(m) => {
            let mut m = m.clone();
            let wk = write_key(&m, key);
            m.insert(wk, new_value);
            Ok(Value::Map(m))
        }
        Value::Nil => {
            let mut m = IndexMap::new();
            m.insert(key.clone(), new_value);
            Ok(Value::Map(m))
        }
        Value::Vector(items) => match key {
            Value::Int(i) if *i >= 0 && (*i as usize) <= items.len() => {
                let mut items = items.clone();
                let i = *i as usize;
                if i == items.len() {
                    items.push(new_value);
                } else {
                    items[i] = new_value;
                }
                Ok(Value::Vector(items))
            }
            other => Err(LispError::runtime_error(
                "assoc-in",
                format!("index {} out of bounds", other),
            )),
        },
        other => Err(LispError::type_error("assoc-in", "map or vector", other, 1)),
    }
}

/// `(update m k f & extra)` applies `f` to the current value.
#[builtin(name = "update", variadic_nonempty)]
pub fn builtin_update(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    if args.len() < 3 {
        return Err(LispError::arity_error("update", "at least 3", args.len()));
    }
    let map = match &args[0] {
        Value::Map(m) => m.clone(),
        Value::Nil => IndexMap::new(),
        other => return Err(LispError::type_error("update", "map", other, 1)),
    };
    let key = &args[1];
    let current = flex_lookup(&map, key).cloned().unwrap_or(Value::Nil);
    let mut call_args = vec![current];
    call_args.extend(args[3..].iter().cloned());
    let updated = interp.apply(&args[2], &call_args)?;
    if updated.is_sentinel() {
        return Ok(updated);
    }
    let mut out = map;
    let wk = write_key(&out, key);
    out.insert(wk, updated);
    let v = Value::Map(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "update-in", variadic_nonempty)]
pub fn builtin_update_in(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    if args.len() < 3 {
        return Err(LispError::arity_error("update-in", "at least 3", args.len()));
    }
    let path = match &args[1] {
        Value::Vector(p) if !p.is_empty() => p.clone(),
        Value::Vector(_) => return Err(LispError::runtime_error("update-in", "empty path")),
        other => return Err(LispError::type_error("update-in", "vector", other, 2)),
    };
    let current = {
        let mut c = args[0].clone();
        for key in &path {
            c = lookup(&c, key, &Value::Nil);
        }
        c
    };
    let mut call_args = vec![current];
    call_args.extend(args[3..].iter().cloned());
    let updated = interp.apply(&args[2], &call_args)?;
    if updated.is_sentinel() {
        return Ok(updated);
    }
    let out = assoc_path(&args[0], &path, updated)?;
    interp.charge(out.heap_cost())?;
    Ok(out)
}

#[builtin(name = "update-vals", arity = 2)]
pub fn builtin_update_vals(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let map = match &args[0] {
        Value::Map(m) => m.clone(),
        other => return Err(LispError::type_error("update-vals", "map", other, 1)),
    };
    let mut out = IndexMap::with_capacity(map.len());
    for (k, v) in map {
        let updated = interp.apply(&args[1], &[v])?;
        if updated.is_sentinel() {
            return Ok(updated);
        }
        out.insert(k, updated);
    }
    let v = Value::Map(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "update-keys", arity = 2)]
pub fn builtin_update_keys(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let map = match &args[0] {
        Value::Map(m) => m.clone(),
        other => return Err(LispError::type_error("update-keys", "map", other, 1)),
    };
    let mut out = IndexMap::with_capacity(map.len());
    for (k, v) in map {
        let updated = interp.apply(&args[1], &[k])?;
        if updated.is_sentinel() {
            return Ok(updated);
        }
        out.insert(updated, v);
    }
    let v = Value::Map(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

/// Right-wins merge; nil arguments are skipped, all-nil yields nil.
#[builtin(name = "merge", variadic)]
pub fn builtin_merge(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let mut out: Option<IndexMap<Value, Value>> = None;
    for (i, arg) in args.iter().enumerate() {
        match arg {
            Value::Nil => {}
            Value::Map(m) => {
                let target = out.get_or_insert_with(IndexMap::new);
                for (k, v) in m {
                    target.insert(k.clone(), v.clone());
                }
            }
            other => return Err(LispError::type_error("merge", "map", other, i + 1)),
        }
    }
    match out {
        None => Ok(Value::Nil),
        Some(m) => {
            let v = Value::Map(m);
            interp.charge(v.heap_cost())?;
            Ok(v)
        }
    }
}

/// `(merge-with f m1 m2 …)` resolves key conflicts through `f`.
#[builtin(name = "merge-with", variadic_nonempty)]
pub fn builtin_merge_with(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    if args.len() < 2 {
        return Err(LispError::arity_error("merge-with", "at least 2", args.len()));
    }
    let f = &args[0];
    let mut out: Option<IndexMap<Value, Value>> = None;
    for (i, arg) in args[1..].iter().enumerate() {
        match arg {
            Value::Nil => {}
            Value::Map(m) => {
                let target = out.get_or_insert_with(IndexMap::new);
                for (k, v) in m {
                    match target.get(k).cloned() {
                        Some(existing) => {
                            let combined = interp.apply(f, &[existing, v.clone()])?;
                            if combined.is_sentinel() {
                                return Ok(combined);
                            }
                            target.insert(k.clone(), combined);
                        }
                        None => {
                            target.insert(k.clone(), v.clone());
                        }
                    }
                }
            }
            other => return Err(LispError::type_error("merge-with", "map", other, i + 2)),
        }
    }
    match out {
        None => Ok(Value::Nil),
        Some(m) => {
            let v = Value::Map(m);
            interp.charge(v.heap_cost())?;
            Ok(v)
        }
    }
}

#[builtin(name = "select-keys", arity = 2)]
pub fn builtin_select_keys(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let map = match &args[0] {
        Value::Map(m) => m,
        Value::Nil => return Ok(Value::Map(IndexMap::new())),
        other => return Err(LispError::type_error("select-keys", "map", other, 1)),
    };
    let keys = seq_items("select-keys", &args[1], 2)?;
    let mut out = IndexMap::new();
    for key in keys {
        if let Some(v) = flex_lookup(map, &key) {
            out.insert(write_key(map, &key), v.clone());
        }
    }
    let v = Value::Map(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

/// Removes the literal keys given; reads coerce, writes do not.
#[builtin(name = "dissoc", variadic_nonempty)]
pub fn builtin_dissoc(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let mut map = match &args[0] {
        Value::Map(m) => m.clone(),
        Value::Nil => return Ok(Value::Nil),
        other => return Err(LispError::type_error("dissoc", "map", other, 1)),
    };
    for key in &args[1..] {
        map.shift_remove(key);
    }
    let v = Value::Map(map);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "keys", arity = 1)]
pub fn builtin_keys(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let map = match &args[0] {
        Value::Map(m) => m,
        Value::Nil => return Ok(Value::Vector(Vec::new())),
        other => return Err(LispError::type_error("keys", "map", other, 1)),
    };
    let v = Value::Vector(map.keys().cloned().collect());
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "vals", arity = 1)]
pub fn builtin_vals(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let map = match &args[0] {
        Value::Map(m) => m,
        Value::Nil => return Ok(Value::Vector(Vec::new())),
        other => return Err(LispError::type_error("vals", "map", other, 1)),
    };
    let v = Value::Vector(map.values().cloned().collect());
    interp.charge(v.heap_cost())?;
    Ok(v)
}

/// Membership across maps (flex key), sets, vectors (index) and strings
/// (substring).
#[builtin(name = "contains?", arity = 2)]
pub fn builtin_contains_p(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let found = match (&args[0], &args[1]) {
        (Value::Map(m), key) => flex_contains(m, key),
        (Value::Set(s), key) => s.contains(key),
        (Value::Vector(items), Value::Int(i)) => *i >= 0 && (*i as usize) < items.len(),
        (Value::Vector(_), _) => false,
        (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
        (Value::Nil, _) => false,
        (other, _) => {
            return Err(LispError::type_error("contains?", "collection", other, 1))
        }
    };
    Ok(Value::Bool(found))
}

pub fn register(table: &mut super::BuiltinTable) {
    register_builtin_get(table);
    register_builtin_get_in(table);
    register_builtin_assoc(table);
    register_builtin_assoc_in(table);
    register_builtin_update(table);
    register_builtin_update_in(table);
    register_builtin_update_vals(table);
    register_builtin_update_keys(table);
    register_builtin_merge(table);
    register_builtin_merge_with(table);
    register_builtin_select_keys(table);
    register_builtin_dissoc(table);
    register_builtin_keys(table);
    register_builtin_vals(table);
    register_builtin_contains_p(table);
}

#[cfg(test)]
mod tests {
    use crate::value::Value;

    fn eval_src(src: &str) -> Value {
        crate::test_eval(src).unwrap()
    }

    fn v(src: &str) -> Value {
        crate::analyzer::form_to_value(&crate::parser::parse_one(src).unwrap())
    }

    #[test]
    fn test_get_flex_keys() {
        assert_eq!(eval_src("(get {:k 1} :k)"), Value::Int(1));
        assert_eq!(eval_src("(get {:k 1} \"k\")"), Value::Int(1));
        assert_eq!(eval_src("(get {\"k\" 1} :k)"), Value::Int(1));
        assert_eq!(eval_src("(get {} :k :default)"), v(":default"));
        assert_eq!(eval_src("(get [10 20] 1)"), Value::Int(20));
        assert_eq!(eval_src("(get nil :k)"), Value::Nil);
    }

    #[test]
    fn test_get_in() {
        assert_eq!(eval_src("(get-in {:a {:b [1 2]}} [:a :b 1])"), Value::Int(2));
        assert_eq!(eval_src("(get-in {} [:a :b] :miss)"), v(":miss"));
    }

    #[test]
    fn test_assoc_preserves_caller_key() {
        assert_eq!(eval_src("(assoc {} :a 1 :b 2)"), v("{:a 1, :b 2}"));
        assert_eq!(eval_src("(assoc {} \"a\" 1)"), v("{\"a\" 1}"));
        assert_eq!(eval_src("(assoc [1 2] 0 9)"), v("[9 2]"));
        assert_eq!(eval_src("(assoc [1] 1 2)"), v("[1 2]"));
        assert_eq!(eval_src("(assoc nil :a 1)"), v("{:a 1}"));
    }

    #[test]
    fn test_assoc_in_update_in() {
        assert_eq!(
            eval_src("(assoc-in {:a {:b 1}} [:a :b] 2)"),
            v("{:a {:b 2}}")
        );
        assert_eq!(eval_src("(assoc-in {} [:a :b] 1)"), v("{:a {:b 1}}"));
        assert_eq!(
            eval_src("(update-in {:a {:n 1}} [:a :n] inc)"),
            v("{:a {:n 2}}")
        );
    }

    #[test]
    fn test_update_reuses_existing_spelling() {
        assert_eq!(eval_src("(update {:n 1} :n inc)"), v("{:n 2}"));
        assert_eq!(eval_src("(update {\"n\" 1} :n inc)"), v("{\"n\" 2}"));
        assert_eq!(eval_src("(update {:n 5} :n + 10)"), v("{:n 15}"));
        assert_eq!(eval_src("(update {} :n (fn [x] (if (nil? x) 1 x)))"), v("{:n 1}"));
    }

    #[test]
    fn test_update_vals_keys() {
        assert_eq!(eval_src("(update-vals {:a 1 :b 2} inc)"), v("{:a 2, :b 3}"));
        assert_eq!(eval_src("(update-keys {:a 1} str)"), v("{\"a\" 1}"));
    }

    #[test]
    fn test_merge() {
        assert_eq!(eval_src("(merge {:a 1} {:a 2 :b 3})"), v("{:a 2, :b 3}"));
        assert_eq!(eval_src("(merge nil {:a 1})"), v("{:a 1}"));
        assert_eq!(eval_src("(merge)"), Value::Nil);
        assert_eq!(
            eval_src("(merge-with + {:a 1} {:a 2 :b 3})"),
            v("{:a 3, :b 3}")
        );
    }

    #[test]
    fn test_select_dissoc_keys_vals() {
        assert_eq!(eval_src("(select-keys {:a 1 :b 2} [:a])"), v("{:a 1}"));
        assert_eq!(eval_src("(select-keys {\"a\" 1} [:a])"), v("{\"a\" 1}"));
        assert_eq!(eval_src("(dissoc {:a 1 :b 2} :a)"), v("{:b 2}"));
        // dissoc is a write: it does not coerce spellings
        assert_eq!(eval_src("(dissoc {\"a\" 1} :a)"), v("{\"a\" 1}"));
        assert_eq!(eval_src("(keys {:a 1 :b 2})"), v("[:a :b]"));
        assert_eq!(eval_src("(vals {:a 1 :b 2})"), v("[1 2]"));
    }

    #[test]
    fn test_contains() {
        assert_eq!(eval_src("(contains? {:a 1} :a)"), Value::Bool(true));
        assert_eq!(eval_src("(contains? {\"a\" 1} :a)"), Value::Bool(true));
        assert_eq!(eval_src("(contains? #{1 2} 2)"), Value::Bool(true));
        assert_eq!(eval_src("(contains? [10 20] 1)"), Value::Bool(true));
        assert_eq!(eval_src("(contains? [10 20] 2)"), Value::Bool(false));
        assert_eq!(eval_src("(contains? \"hello\" \"ell\")"), Value::Bool(true));
        assert_eq!(eval_src("(contains? nil :a)"), Value::Bool(false));
    }
}
