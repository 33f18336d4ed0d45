//! Comparison operations: = not= != < <= > >=
//!
//! `=` is structural across vectors, maps and sets; the ordering operators
//! apply to numbers only and promote int/float pairwise.

use super::as_num;
use crate::error::LispError;
use crate::eval::Interp;
use crate::value::Value;
use ptc_macros::builtin;

#[builtin(name = "=", variadic_nonempty)]
pub fn builtin_eq(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let equal = args.windows(2).all(|pair| pair[0] == pair[1]);
    Ok(Value::Bool(equal))
}

#[builtin(name = "not=", variadic_nonempty)]
pub fn builtin_not_eq(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let equal = args.windows(2).all(|pair| pair[0] == pair[1]);
    Ok(Value::Bool(!equal))
}

/// Alias of `not=`, accepted because `(where :f != v)` reads naturally.
#[builtin(name = "!=", variadic_nonempty)]
pub fn builtin_bang_eq(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    builtin_not_eq(interp, args)
}

fn ordered(
    function: &str,
    args: &[Value],
    keep: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, LispError> {
    for (i, pair) in args.windows(2).enumerate() {
        let a = as_num(function, &pair[0], i + 1)?.as_f64();
        let b = as_num(function, &pair[1], i + 2)?.as_f64();
        let ord = a
            .partial_cmp(&b)
            .ok_or_else(|| LispError::runtime_error(function, "cannot order NaN"))?;
        if !keep(ord) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

#[builtin(name = "<", variadic_nonempty)]
pub fn builtin_lt(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    ordered("<", args, |o| o == std::cmp::Ordering::Less)
}

#[builtin(name = "<=", variadic_nonempty)]
pub fn builtin_le(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    ordered("<=", args, |o| o != std::cmp::Ordering::Greater)
}

#[builtin(name = ">", variadic_nonempty)]
pub fn builtin_gt(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    ordered(">", args, |o| o == std::cmp::Ordering::Greater)
}

#[builtin(name = ">=", variadic_nonempty)]
pub fn builtin_ge(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    ordered(">=", args, |o| o != std::cmp::Ordering::Less)
}

pub fn register(table: &mut super::BuiltinTable) {
    register_builtin_eq(table);
    register_builtin_not_eq(table);
    register_builtin_bang_eq(table);
    register_builtin_lt(table);
    register_builtin_le(table);
    register_builtin_gt(table);
    register_builtin_ge(table);
}
