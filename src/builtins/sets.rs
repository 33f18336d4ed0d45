//! Set operations: set, union, intersection, difference

use super::seq_items;
use crate::error::LispError;
use crate::eval::Interp;
use crate::value::Value;
use indexmap::IndexSet;
use ptc_macros::builtin;

fn as_set(function: &str, v: &Value, pos: usize) -> Result<IndexSet<Value>, LispError> {
    match v {
        Value::Set(s) => Ok(s.clone()),
        Value::Vector(_) | Value::Nil => Ok(seq_items(function, v, pos)?.into_iter().collect()),
        other => Err(LispError::type_error(function, "set", other, pos)),
    }
}

#[builtin(name = "set", arity = 1)]
pub fn builtin_set(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let items = seq_items("set", &args[0], 1)?;
    let v = Value::Set(items.into_iter().collect());
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "union", variadic_nonempty)]
pub fn builtin_union(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let mut out = as_set("union", &args[0], 1)?;
    for (i, arg) in args[1..].iter().enumerate() {
        out.extend(as_set("union", arg, i + 2)?);
    }
    let v = Value::Set(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "intersection", variadic_nonempty)]
pub fn builtin_intersection(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let mut out = as_set("intersection", &args[0], 1)?;
    for (i, arg) in args[1..].iter().enumerate() {
        let other = as_set("intersection", arg, i + 2)?;
        out.retain(|v| other.contains(v));
    }
    let v = Value::Set(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "difference", variadic_nonempty)]
pub fn builtin_difference(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let mut out = as_set("difference", &args[0], 1)?;
    for (i, arg) in args[1..].iter().enumerate() {
        let other = as_set("difference", arg, i + 2)?;
        out.retain(|v| !other.contains(v));
    }
    let v = Value::Set(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

pub fn register(table: &mut super::BuiltinTable) {
    register_builtin_set(table);
    register_builtin_union(table);
    register_builtin_intersection(table);
    register_builtin_difference(table);
}
