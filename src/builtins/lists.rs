//! Sequence operations and the higher-order function family
//!
//! Collections coerce to item sequences uniformly: vectors and sets yield
//! their elements in insertion order, maps yield `[k v]` entry pairs. All
//! sequence-producing operations return vectors.
//!
//! Higher-order entries accept any callable — closures, builtins, keywords
//! acting as field accessors — and propagate `return`/`fail` sentinels
//! produced inside callees.

use super::{as_int, as_num, call1, cmp_values, seq_items, Num};
use crate::analyzer::{Expr, FnDef, Pattern};
use crate::env::Env;
use crate::error::LispError;
use crate::eval::Interp;
use crate::value::{Closure, Value};
use indexmap::{IndexMap, IndexSet};
use ptc_macros::builtin;
use std::cmp::Ordering;
use std::sync::Arc;

/// Callable used for key access: strings act like keywords so that
/// `(pluck "price" coll)` works on LLM-spelled programs.
fn as_callable(v: &Value) -> Value {
    match v {
        Value::String(s) => Value::Keyword(s.clone()),
        other => other.clone(),
    }
}

#[builtin(name = "count", arity = 1)]
pub fn builtin_count(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let n = match &args[0] {
        Value::Vector(v) => v.len(),
        Value::Map(m) => m.len(),
        Value::Set(s) => s.len(),
        Value::String(s) => s.chars().count(),
        Value::Nil => 0,
        other => return Err(LispError::type_error("count", "collection", other, 1)),
    };
    Ok(Value::Int(n as i64))
}

#[builtin(name = "empty?", arity = 1)]
pub fn builtin_empty_p(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    match builtin_count(interp, args)? {
        Value::Int(n) => Ok(Value::Bool(n == 0)),
        _ => unreachable!(),
    }
}

#[builtin(name = "first", arity = 1)]
pub fn builtin_first(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let items = seq_items("first", &args[0], 1)?;
    Ok(items.first().cloned().unwrap_or(Value::Nil))
}

#[builtin(name = "second", arity = 1)]
pub fn builtin_second(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let items = seq_items("second", &args[0], 1)?;
    Ok(items.get(1).cloned().unwrap_or(Value::Nil))
}

#[builtin(name = "last", arity = 1)]
pub fn builtin_last(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let items = seq_items("last", &args[0], 1)?;
    Ok(items.last().cloned().unwrap_or(Value::Nil))
}

/// `(nth coll i)` errors out of bounds; `(nth coll i default)` does not.
#[builtin(name = "nth", arities(2, 3))]
pub fn builtin_nth(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let items = seq_items("nth", &args[0], 1)?;
    let i = as_int("nth", &args[1], 2)?;
    if i >= 0 {
        if let Some(v) = items.get(i as usize) {
            return Ok(v.clone());
        }
    }
    match args.get(2) {
        Some(default) => Ok(default.clone()),
        None => Err(LispError::runtime_error(
            "nth",
            format!("index {} out of bounds for length {}", i, items.len()),
        )),
    }
}

#[builtin(name = "rest", arity = 1)]
pub fn builtin_rest(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let items = seq_items("rest", &args[0], 1)?;
    Ok(Value::Vector(items.into_iter().skip(1).collect()))
}

/// Like `rest`, but empty yields nil.
#[builtin(name = "next", arity = 1)]
pub fn builtin_next(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let items = seq_items("next", &args[0], 1)?;
    if items.len() <= 1 {
        return Ok(Value::Nil);
    }
    Ok(Value::Vector(items.into_iter().skip(1).collect()))
}

#[builtin(name = "ffirst", arity = 1)]
pub fn builtin_ffirst(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let first = builtin_first(interp, args)?;
    builtin_first(interp, &[first])
}

#[builtin(name = "fnext", arity = 1)]
pub fn builtin_fnext(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let next = builtin_next(interp, args)?;
    builtin_first(interp, &[next])
}

#[builtin(name = "nfirst", arity = 1)]
pub fn builtin_nfirst(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let first = builtin_first(interp, args)?;
    builtin_next(interp, &[first])
}

#[builtin(name = "nnext", arity = 1)]
pub fn builtin_nnext(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let next = builtin_next(interp, args)?;
    builtin_next(interp, &[next])
}

/// Collection → ordered item vector; empty collections yield nil.
#[builtin(name = "seq", arity = 1)]
pub fn builtin_seq(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let items = seq_items("seq", &args[0], 1)?;
    if items.is_empty() {
        return Ok(Value::Nil);
    }
    Ok(Value::Vector(items))
}

#[builtin(name = "conj", variadic_nonempty)]
pub fn builtin_conj(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let mut out = match &args[0] {
        Value::Nil => Value::Vector(Vec::new()),
        other => other.clone(),
    };
    for (i, item) in args[1..].iter().enumerate() {
        match &mut out {
            Value::Vector(v) => v.push(item.clone()),
            Value::Set(s) => {
                s.insert(item.clone());
            }
            Value::Map(m) => match item {
                Value::Vector(pair) if pair.len() == 2 => {
                    m.insert(pair[0].clone(), pair[1].clone());
                }
                Value::Map(entries) => {
                    for (k, v) in entries {
                        m.insert(k.clone(), v.clone());
                    }
                }
                other => {
                    return Err(LispError::type_error("conj", "[k v] entry", other, i + 2))
                }
            },
            other => return Err(LispError::type_error("conj", "collection", other, 1)),
        }
    }
    interp.charge(out.heap_cost())?;
    Ok(out)
}

#[builtin(name = "cons", arity = 2)]
pub fn builtin_cons(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let mut out = vec![args[0].clone()];
    out.extend(seq_items("cons", &args[1], 2)?);
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

/// `(into to from)` pours items in, respecting the target's kind.
#[builtin(name = "into", arity = 2)]
pub fn builtin_into(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let items = seq_items("into", &args[1], 2)?;
    let mut conj_args = vec![args[0].clone()];
    conj_args.extend(items);
    builtin_conj(interp, &conj_args)
}

#[builtin(name = "concat", variadic)]
pub fn builtin_concat(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let mut out = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        out.extend(seq_items("concat", arg, i + 1)?);
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

fn flatten_into(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Vector(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => out.push(other.clone()),
    }
}

#[builtin(name = "flatten", arity = 1)]
pub fn builtin_flatten(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let mut out = Vec::new();
    flatten_into(&args[0], &mut out);
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

/// Pairs up collections positionally, stopping at the shortest.
#[builtin(name = "zip", variadic_nonempty)]
pub fn builtin_zip(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let colls: Vec<Vec<Value>> = args
        .iter()
        .enumerate()
        .map(|(i, a)| seq_items("zip", a, i + 1))
        .collect::<Result<_, _>>()?;
    let len = colls.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        out.push(Value::Vector(colls.iter().map(|c| c[i].clone()).collect()));
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "interleave", variadic_nonempty)]
pub fn builtin_interleave(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let colls: Vec<Vec<Value>> = args
        .iter()
        .enumerate()
        .map(|(i, a)| seq_items("interleave", a, i + 1))
        .collect::<Result<_, _>>()?;
    let len = colls.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(len * colls.len());
    for i in 0..len {
        for coll in &colls {
            out.push(coll[i].clone());
        }
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "take", arity = 2)]
pub fn builtin_take(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let n = as_int("take", &args[0], 1)?.max(0) as usize;
    let items = seq_items("take", &args[1], 2)?;
    let v = Value::Vector(items.into_iter().take(n).collect());
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "drop", arity = 2)]
pub fn builtin_drop(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let n = as_int("drop", &args[0], 1)?.max(0) as usize;
    let items = seq_items("drop", &args[1], 2)?;
    let v = Value::Vector(items.into_iter().skip(n).collect());
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "take-while", arity = 2)]
pub fn builtin_take_while(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let f = as_callable(&args[0]);
    let items = seq_items("take-while", &args[1], 2)?;
    let mut out = Vec::new();
    for item in items {
        match call1(interp, &f, item.clone())? {
            Ok(v) if v.is_truthy() => out.push(item),
            Ok(_) => break,
            Err(sentinel) => return Ok(sentinel),
        }
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "drop-while", arity = 2)]
pub fn builtin_drop_while(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let f = as_callable(&args[0]);
    let items = seq_items("drop-while", &args[1], 2)?;
    let mut out = Vec::new();
    let mut dropping = true;
    for item in items {
        if dropping {
            match call1(interp, &f, item.clone())? {
                Ok(v) if v.is_truthy() => continue,
                Ok(_) => dropping = false,
                Err(sentinel) => return Ok(sentinel),
            }
        }
        out.push(item);
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "distinct", arity = 1)]
pub fn builtin_distinct(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let items = seq_items("distinct", &args[0], 1)?;
    let mut seen = IndexSet::new();
    let mut out = Vec::new();
    for item in items {
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "reverse", arity = 1)]
pub fn builtin_reverse(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let mut items = seq_items("reverse", &args[0], 1)?;
    items.reverse();
    let v = Value::Vector(items);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

/// Comparator call contract: negative/`true` means "a before b".
fn call_comparator(
    interp: &mut Interp,
    f: &Value,
    a: &Value,
    b: &Value,
) -> Result<Ordering, LispError> {
    let out = interp.apply(f, &[a.clone(), b.clone()])?;
    Ok(match out {
        Value::Int(n) => n.cmp(&0),
        Value::Float(n) => n.partial_cmp(&0.0).unwrap_or(Ordering::Equal),
        Value::Bool(true) => Ordering::Less,
        _ => Ordering::Greater,
    })
}

fn sorted(
    interp: &mut Interp,
    mut items: Vec<Value>,
    cmp: Option<&Value>,
) -> Result<Vec<Value>, LispError> {
    match cmp {
        None => {
            items.sort_by(cmp_values);
            Ok(items)
        }
        Some(f) => {
            let mut failure: Option<LispError> = None;
            items.sort_by(|a, b| {
                if failure.is_some() {
                    return Ordering::Equal;
                }
                match call_comparator(interp, f, a, b) {
                    Ok(ord) => ord,
                    Err(e) => {
                        failure = Some(e);
                        Ordering::Equal
                    }
                }
            });
            match failure {
                Some(e) => Err(e),
                None => Ok(items),
            }
        }
    }
}

#[builtin(name = "sort", arities(1, 2))]
pub fn builtin_sort(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let (cmp, coll) = if args.len() == 2 {
        (Some(&args[0]), &args[1])
    } else {
        (None, &args[0])
    };
    let items = seq_items("sort", coll, args.len())?;
    let v = Value::Vector(sorted(interp, items, cmp)?);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "sort-by", arities(2, 3))]
pub fn builtin_sort_by(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let keyfn = as_callable(&args[0]);
    let (cmp, coll) = if args.len() == 3 {
        (Some(&args[1]), &args[2])
    } else {
        (None, &args[1])
    };
    let items = seq_items("sort-by", coll, args.len())?;
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        match call1(interp, &keyfn, item.clone())? {
            Ok(key) => keyed.push((key, item)),
            Err(sentinel) => return Ok(sentinel),
        }
    }
    match cmp {
        None => keyed.sort_by(|(ka, _), (kb, _)| cmp_values(ka, kb)),
        Some(f) => {
            let mut failure: Option<LispError> = None;
            keyed.sort_by(|(ka, _), (kb, _)| {
                if failure.is_some() {
                    return Ordering::Equal;
                }
                match call_comparator(interp, f, ka, kb) {
                    Ok(ord) => ord,
                    Err(e) => {
                        failure = Some(e);
                        Ordering::Equal
                    }
                }
            });
            if let Some(e) = failure {
                return Err(e);
            }
        }
    }
    let v = Value::Vector(keyed.into_iter().map(|(_, item)| item).collect());
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "group-by", arity = 2)]
pub fn builtin_group_by(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let f = as_callable(&args[0]);
    let items = seq_items("group-by", &args[1], 2)?;
    let mut groups: IndexMap<Value, Value> = IndexMap::new();
    for item in items {
        let key = match call1(interp, &f, item.clone())? {
            Ok(k) => k,
            Err(sentinel) => return Ok(sentinel),
        };
        match groups.entry(key).or_insert_with(|| Value::Vector(Vec::new())) {
            Value::Vector(bucket) => bucket.push(item),
            _ => unreachable!(),
        }
    }
    let v = Value::Map(groups);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "frequencies", arity = 1)]
pub fn builtin_frequencies(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let items = seq_items("frequencies", &args[0], 1)?;
    let mut counts: IndexMap<Value, Value> = IndexMap::new();
    for item in items {
        match counts.entry(item).or_insert(Value::Int(0)) {
            Value::Int(n) => *n += 1,
            _ => unreachable!(),
        }
    }
    let v = Value::Map(counts);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

fn partitioned(function: &str, args: &[Value]) -> Result<(usize, usize, Vec<Value>), LispError> {
    let n = as_int(function, &args[0], 1)?;
    if n <= 0 {
        return Err(LispError::runtime_error(function, "size must be positive"));
    }
    let (step, coll) = if args.len() == 3 {
        let s = as_int(function, &args[1], 2)?;
        if s <= 0 {
            return Err(LispError::runtime_error(function, "step must be positive"));
        }
        (s as usize, &args[2])
    } else {
        (n as usize, &args[1])
    };
    let items = seq_items(function, coll, args.len())?;
    Ok((n as usize, step, items))
}

#[builtin(name = "partition", arities(2, 3))]
pub fn builtin_partition(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let (n, step, items) = partitioned("partition", args)?;
    let mut out = Vec::new();
    let mut i = 0;
    while i + n <= items.len() {
        out.push(Value::Vector(items[i..i + n].to_vec()));
        i += step;
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "partition-all", arities(2, 3))]
pub fn builtin_partition_all(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let (n, step, items) = partitioned("partition-all", args)?;
    let mut out = Vec::new();
    let mut i = 0;
    while i < items.len() {
        out.push(Value::Vector(items[i..(i + n).min(items.len())].to_vec()));
        i += step;
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "map", variadic_nonempty)]
pub fn builtin_map(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    if args.len() < 2 {
        return Err(LispError::arity_error("map", "at least 2", args.len()));
    }
    let f = as_callable(&args[0]);
    let colls: Vec<Vec<Value>> = args[1..]
        .iter()
        .enumerate()
        .map(|(i, a)| seq_items("map", a, i + 2))
        .collect::<Result<_, _>>()?;
    let len = colls.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let call_args: Vec<Value> = colls.iter().map(|c| c[i].clone()).collect();
        let r = interp.apply(&f, &call_args)?;
        if r.is_sentinel() {
            return Ok(r);
        }
        out.push(r);
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

/// Identical to `map` here: sequences are vectors throughout.
#[builtin(name = "mapv", variadic_nonempty)]
pub fn builtin_mapv(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    builtin_map(interp, args)
}

#[builtin(name = "map-indexed", arity = 2)]
pub fn builtin_map_indexed(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let f = as_callable(&args[0]);
    let items = seq_items("map-indexed", &args[1], 2)?;
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let r = interp.apply(&f, &[Value::Int(i as i64), item])?;
        if r.is_sentinel() {
            return Ok(r);
        }
        out.push(r);
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "filter", arity = 2)]
pub fn builtin_filter(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let f = as_callable(&args[0]);
    let items = seq_items("filter", &args[1], 2)?;
    let mut out = Vec::new();
    for item in items {
        match call1(interp, &f, item.clone())? {
            Ok(v) if v.is_truthy() => out.push(item),
            Ok(_) => {}
            Err(sentinel) => return Ok(sentinel),
        }
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "remove", arity = 2)]
pub fn builtin_remove(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let f = as_callable(&args[0]);
    let items = seq_items("remove", &args[1], 2)?;
    let mut out = Vec::new();
    for item in items {
        match call1(interp, &f, item.clone())? {
            Ok(v) if !v.is_truthy() => out.push(item),
            Ok(_) => {}
            Err(sentinel) => return Ok(sentinel),
        }
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

/// First item satisfying the predicate, or nil.
#[builtin(name = "find", arity = 2)]
pub fn builtin_find(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let f = as_callable(&args[0]);
    let items = seq_items("find", &args[1], 2)?;
    for item in items {
        match call1(interp, &f, item.clone())? {
            Ok(v) if v.is_truthy() => return Ok(item),
            Ok(_) => {}
            Err(sentinel) => return Ok(sentinel),
        }
    }
    Ok(Value::Nil)
}

/// Keeps non-nil results of `f` (false survives).
#[builtin(name = "keep", arity = 2)]
pub fn builtin_keep(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let f = as_callable(&args[0]);
    let items = seq_items("keep", &args[1], 2)?;
    let mut out = Vec::new();
    for item in items {
        match call1(interp, &f, item)? {
            Ok(Value::Nil) => {}
            Ok(v) => out.push(v),
            Err(sentinel) => return Ok(sentinel),
        }
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "keep-indexed", arity = 2)]
pub fn builtin_keep_indexed(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let f = as_callable(&args[0]);
    let items = seq_items("keep-indexed", &args[1], 2)?;
    let mut out = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        let r = interp.apply(&f, &[Value::Int(i as i64), item])?;
        if r.is_sentinel() {
            return Ok(r);
        }
        if !matches!(r, Value::Nil) {
            out.push(r);
        }
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

/// `(reduce f coll)` and `(reduce f init coll)`.
#[builtin(name = "reduce", arities(2, 3))]
pub fn builtin_reduce(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let f = as_callable(&args[0]);
    let (mut acc, items) = if args.len() == 3 {
        (args[1].clone(), seq_items("reduce", &args[2], 3)?)
    } else {
        let items = seq_items("reduce", &args[1], 2)?;
        match items.split_first() {
            // empty collection reduces to (f) with no arguments
            None => return interp.apply(&f, &[]),
            Some((first, rest)) => (first.clone(), rest.to_vec()),
        }
    };
    for item in items {
        acc = interp.apply(&f, &[acc, item])?;
        if acc.is_sentinel() {
            return Ok(acc);
        }
    }
    Ok(acc)
}

/// First truthy predicate *result*, or nil.
#[builtin(name = "some", arity = 2)]
pub fn builtin_some(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let f = as_callable(&args[0]);
    let items = seq_items("some", &args[1], 2)?;
    for item in items {
        match call1(interp, &f, item)? {
            Ok(v) if v.is_truthy() => return Ok(v),
            Ok(_) => {}
            Err(sentinel) => return Ok(sentinel),
        }
    }
    Ok(Value::Nil)
}

#[builtin(name = "every?", arity = 2)]
pub fn builtin_every_p(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let f = as_callable(&args[0]);
    let items = seq_items("every?", &args[1], 2)?;
    for item in items {
        match call1(interp, &f, item)? {
            Ok(v) if !v.is_truthy() => return Ok(Value::Bool(false)),
            Ok(_) => {}
            Err(sentinel) => return Ok(sentinel),
        }
    }
    Ok(Value::Bool(true))
}

#[builtin(name = "not-any?", arity = 2)]
pub fn builtin_not_any_p(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    match builtin_some(interp, args)? {
        v if v.is_sentinel() => Ok(v),
        v => Ok(Value::Bool(!v.is_truthy())),
    }
}

/// Field extraction over a record collection.
#[builtin(name = "pluck", arity = 2)]
pub fn builtin_pluck(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let f = as_callable(&args[0]);
    let items = seq_items("pluck", &args[1], 2)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match call1(interp, &f, item)? {
            Ok(v) => out.push(v),
            Err(sentinel) => return Ok(sentinel),
        }
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

fn keyed_numbers(
    function: &str,
    interp: &mut Interp,
    args: &[Value],
) -> Result<Result<Vec<Num>, Value>, LispError> {
    let f = as_callable(&args[0]);
    let items = seq_items(function, &args[1], 2)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match call1(interp, &f, item)? {
            Ok(v) => out.push(as_num(function, &v, 1)?),
            Err(sentinel) => return Ok(Err(sentinel)),
        }
    }
    Ok(Ok(out))
}

#[builtin(name = "sum-by", arity = 2)]
pub fn builtin_sum_by(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let nums = match keyed_numbers("sum-by", interp, args)? {
        Ok(nums) => nums,
        Err(sentinel) => return Ok(sentinel),
    };
    let mut acc = Num::Int(0);
    for n in nums {
        acc = match (acc, n) {
            (Num::Int(a), Num::Int(b)) => Num::Int(a.wrapping_add(b)),
            (a, b) => Num::Float(a.as_f64() + b.as_f64()),
        };
    }
    Ok(acc.to_value())
}

/// Mean of the keyed values; empty collection yields nil.
#[builtin(name = "avg-by", arity = 2)]
pub fn builtin_avg_by(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let nums = match keyed_numbers("avg-by", interp, args)? {
        Ok(nums) => nums,
        Err(sentinel) => return Ok(sentinel),
    };
    if nums.is_empty() {
        return Ok(Value::Nil);
    }
    let sum: f64 = nums.iter().map(|n| n.as_f64()).sum();
    Ok(Value::Float(sum / nums.len() as f64))
}

fn extreme_by(
    function: &str,
    interp: &mut Interp,
    args: &[Value],
    want_max: bool,
) -> Result<Value, LispError> {
    let f = as_callable(&args[0]);
    let items = seq_items(function, &args[1], 2)?;
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let key = match call1(interp, &f, item.clone())? {
            Ok(k) => k,
            Err(sentinel) => return Ok(sentinel),
        };
        let better = match &best {
            None => true,
            Some((best_key, _)) => {
                let ord = cmp_values(&key, best_key);
                if want_max {
                    ord == Ordering::Greater
                } else {
                    ord == Ordering::Less
                }
            }
        };
        if better {
            best = Some((key, item));
        }
    }
    Ok(best.map(|(_, item)| item).unwrap_or(Value::Nil))
}

#[builtin(name = "min-by", arity = 2)]
pub fn builtin_min_by(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    extreme_by("min-by", interp, args, false)
}

#[builtin(name = "max-by", arity = 2)]
pub fn builtin_max_by(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    extreme_by("max-by", interp, args, true)
}

#[builtin(name = "identity", arity = 1)]
pub fn builtin_identity(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(args[0].clone())
}

/// `(apply f a b coll)` — call `f` with leading args plus the final
/// collection spread.
#[builtin(name = "apply", variadic_nonempty)]
pub fn builtin_apply(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    if args.len() < 2 {
        return Err(LispError::arity_error("apply", "at least 2", args.len()));
    }
    let f = &args[0];
    let mut call_args: Vec<Value> = args[1..args.len() - 1].to_vec();
    call_args.extend(seq_items("apply", &args[args.len() - 1], args.len())?);
    interp.apply(f, &call_args)
}

fn synthetic(name: &str, params: Vec<Pattern>, rest: Option<Pattern>, body: Expr) -> Value {
    Value::Closure(Arc::new(Closure {
        def: Arc::new(FnDef {
            params,
            rest,
            body,
            name: Some(name.to_string()),
        }),
        env: Env::new(),
        ns_snapshot: Arc::new(IndexMap::new()),
    }))
}

#[builtin(name = "constantly", arity = 1)]
pub fn builtin_constantly(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(synthetic(
        "constantly",
        Vec::new(),
        Some(Pattern::Sym("_ignored".to_string())),
        Expr::Literal(args[0].clone()),
    ))
}

/// Right-to-left composition: `((comp f g) x)` is `(f (g x))`.
#[builtin(name = "comp", variadic)]
pub fn builtin_comp(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let apply_def = super::table()
        .get("apply")
        .expect("apply is always registered");
    let mut body = Expr::Call {
        callee: Box::new(Expr::Builtin(apply_def)),
        args: vec![
            Expr::Literal(
                args.last()
                    .cloned()
                    .unwrap_or(Value::Builtin(
                        super::table().get("identity").expect("identity registered"),
                    )),
            ),
            Expr::Local("args".to_string()),
        ],
    };
    if !args.is_empty() {
        for f in args[..args.len() - 1].iter().rev() {
            body = Expr::Call {
                callee: Box::new(Expr::Literal(f.clone())),
                args: vec![body],
            };
        }
    }
    Ok(synthetic(
        "comp",
        Vec::new(),
        Some(Pattern::Sym("args".to_string())),
        body,
    ))
}

#[builtin(name = "partial", variadic_nonempty)]
pub fn builtin_partial(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let apply_def = super::table()
        .get("apply")
        .expect("apply is always registered");
    let concat_def = super::table()
        .get("concat")
        .expect("concat is always registered");
    let preset = Value::Vector(args[1..].to_vec());
    let body = Expr::Call {
        callee: Box::new(Expr::Builtin(apply_def)),
        args: vec![
            Expr::Literal(args[0].clone()),
            Expr::Call {
                callee: Box::new(Expr::Builtin(concat_def)),
                args: vec![
                    Expr::Literal(preset),
                    Expr::Local("more".to_string()),
                ],
            },
        ],
    };
    Ok(synthetic(
        "partial",
        Vec::new(),
        Some(Pattern::Sym("more".to_string())),
        body,
    ))
}

pub fn register(table: &mut super::BuiltinTable) {
    register_builtin_count(table);
    register_builtin_empty_p(table);
    register_builtin_first(table);
    register_builtin_second(table);
    register_builtin_last(table);
    register_builtin_nth(table);
    register_builtin_rest(table);
    register_builtin_next(table);
    register_builtin_ffirst(table);
    register_builtin_fnext(table);
    register_builtin_nfirst(table);
    register_builtin_nnext(table);
    register_builtin_seq(table);
    register_builtin_conj(table);
    register_builtin_cons(table);
    register_builtin_into(table);
    register_builtin_concat(table);
    register_builtin_flatten(table);
    register_builtin_zip(table);
    register_builtin_interleave(table);
    register_builtin_take(table);
    register_builtin_drop(table);
    register_builtin_take_while(table);
    register_builtin_drop_while(table);
    register_builtin_distinct(table);
    register_builtin_reverse(table);
    register_builtin_sort(table);
    register_builtin_sort_by(table);
    register_builtin_group_by(table);
    register_builtin_frequencies(table);
    register_builtin_partition(table);
    register_builtin_partition_all(table);
    register_builtin_map(table);
    register_builtin_mapv(table);
    register_builtin_map_indexed(table);
    register_builtin_filter(table);
    register_builtin_remove(table);
    register_builtin_find(table);
    register_builtin_keep(table);
    register_builtin_keep_indexed(table);
    register_builtin_reduce(table);
    register_builtin_some(table);
    register_builtin_every_p(table);
    register_builtin_not_any_p(table);
    register_builtin_pluck(table);
    register_builtin_sum_by(table);
    register_builtin_avg_by(table);
    register_builtin_min_by(table);
    register_builtin_max_by(table);
    register_builtin_identity(table);
    register_builtin_apply(table);
    register_builtin_constantly(table);
    register_builtin_comp(table);
    register_builtin_partial(table);
}
