//! Arithmetic operations with numeric-tower-lite promotion
//!
//! Any float in a mix makes the result float. `/` always produces a float;
//! empty `+`/`*` return their identities; single-argument `-`/`/` negate or
//! take the reciprocal.

use super::{as_num, Num};
use crate::error::LispError;
use crate::eval::Interp;
use crate::value::Value;
use ptc_macros::builtin;

fn fold(
    function: &str,
    args: &[Value],
    init: Num,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, LispError> {
    let mut acc = init;
    for (i, arg) in args.iter().enumerate() {
        let n = as_num(function, arg, i + 1)?;
        acc = match (acc, n) {
            (Num::Int(a), Num::Int(b)) => Num::Int(int_op(a, b)),
            (a, b) => Num::Float(float_op(a.as_f64(), b.as_f64())),
        };
    }
    Ok(acc.to_value())
}

#[builtin(name = "+", variadic)]
pub fn builtin_add(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    fold("+", args, Num::Int(0), i64::wrapping_add, |a, b| a + b)
}

#[builtin(name = "*", variadic)]
pub fn builtin_mul(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    fold("*", args, Num::Int(1), i64::wrapping_mul, |a, b| a * b)
}

#[builtin(name = "-", variadic_nonempty)]
pub fn builtin_sub(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let first = as_num("-", &args[0], 1)?;
    if args.len() == 1 {
        return Ok(match first {
            Num::Int(i) => Value::Int(-i),
            Num::Float(f) => Value::Float(-f),
        });
    }
    fold("-", &args[1..], first, i64::wrapping_sub, |a, b| a - b)
}

/// Division always promotes to float, including between integers.
#[builtin(name = "/", variadic_nonempty)]
pub fn builtin_div(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let first = as_num("/", &args[0], 1)?.as_f64();
    if args.len() == 1 {
        if first == 0.0 {
            return Err(LispError::runtime_error("/", "division by zero"));
        }
        return Ok(Value::Float(1.0 / first));
    }
    let mut acc = first;
    for (i, arg) in args[1..].iter().enumerate() {
        let n = as_num("/", arg, i + 2)?.as_f64();
        if n == 0.0 {
            return Err(LispError::runtime_error("/", "division by zero"));
        }
        acc /= n;
    }
    Ok(Value::Float(acc))
}

#[builtin(name = "inc", arity = 1)]
pub fn builtin_inc(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    match as_num("inc", &args[0], 1)? {
        Num::Int(i) => Ok(Value::Int(i.wrapping_add(1))),
        Num::Float(f) => Ok(Value::Float(f + 1.0)),
    }
}

#[builtin(name = "dec", arity = 1)]
pub fn builtin_dec(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    match as_num("dec", &args[0], 1)? {
        Num::Int(i) => Ok(Value::Int(i.wrapping_sub(1))),
        Num::Float(f) => Ok(Value::Float(f - 1.0)),
    }
}

#[builtin(name = "abs", arity = 1)]
pub fn builtin_abs(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    match as_num("abs", &args[0], 1)? {
        Num::Int(i) => Ok(Value::Int(i.wrapping_abs())),
        Num::Float(f) => Ok(Value::Float(f.abs())),
    }
}

/// Modulo with the sign of the divisor, Clojure-style.
#[builtin(name = "mod", arity = 2)]
pub fn builtin_mod(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    match (as_num("mod", &args[0], 1)?, as_num("mod", &args[1], 2)?) {
        (Num::Int(a), Num::Int(b)) => {
            if b == 0 {
                return Err(LispError::runtime_error("mod", "division by zero"));
            }
            Ok(Value::Int(((a % b) + b) % b))
        }
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            if b == 0.0 {
                return Err(LispError::runtime_error("mod", "division by zero"));
            }
            Ok(Value::Float(a - b * (a / b).floor()))
        }
    }
}

/// Remainder with the sign of the dividend.
#[builtin(name = "rem", arity = 2)]
pub fn builtin_rem(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    match (as_num("rem", &args[0], 1)?, as_num("rem", &args[1], 2)?) {
        (Num::Int(a), Num::Int(b)) => {
            if b == 0 {
                return Err(LispError::runtime_error("rem", "division by zero"));
            }
            Ok(Value::Int(a % b))
        }
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            if b == 0.0 {
                return Err(LispError::runtime_error("rem", "division by zero"));
            }
            Ok(Value::Float(a % b))
        }
    }
}

#[builtin(name = "min", variadic_nonempty)]
pub fn builtin_min(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let mut best = as_num("min", &args[0], 1)?;
    for (i, arg) in args[1..].iter().enumerate() {
        let n = as_num("min", arg, i + 2)?;
        if n.as_f64() < best.as_f64() {
            best = n;
        }
    }
    Ok(best.to_value())
}

#[builtin(name = "max", variadic_nonempty)]
pub fn builtin_max(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let mut best = as_num("max", &args[0], 1)?;
    for (i, arg) in args[1..].iter().enumerate() {
        let n = as_num("max", arg, i + 2)?;
        if n.as_f64() > best.as_f64() {
            best = n;
        }
    }
    Ok(best.to_value())
}

/// Coerce to an integer: floats truncate, numeric strings parse.
#[builtin(name = "int", arity = 1)]
pub fn builtin_int(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => Ok(Value::Int(*f as i64)),
        Value::String(s) => Ok(s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or(Value::Nil)),
        other => Err(LispError::type_error("int", "number or string", other, 1)),
    }
}

#[builtin(name = "float", arity = 1)]
pub fn builtin_float(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    match &args[0] {
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::String(s) => Ok(s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(Value::Nil)),
        other => Err(LispError::type_error("float", "number or string", other, 1)),
    }
}

/// `(range n)`, `(range start end)`, `(range start end step)`.
/// Bounded by the heap ceiling like any other allocation.
#[builtin(name = "range", arities(1, 2, 3))]
pub fn builtin_range(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let (start, end, step) = match args.len() {
        1 => (0, super::as_int("range", &args[0], 1)?, 1),
        2 => (
            super::as_int("range", &args[0], 1)?,
            super::as_int("range", &args[1], 2)?,
            1,
        ),
        _ => (
            super::as_int("range", &args[0], 1)?,
            super::as_int("range", &args[1], 2)?,
            super::as_int("range", &args[2], 3)?,
        ),
    };
    if step == 0 {
        return Err(LispError::runtime_error("range", "step must not be zero"));
    }
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < end) || (step < 0 && i > end) {
        out.push(Value::Int(i));
        i += step;
        if out.len() % 1024 == 0 {
            interp.charge(1024 * 16)?;
        }
    }
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

pub fn register(table: &mut super::BuiltinTable) {
    register_builtin_add(table);
    register_builtin_mul(table);
    register_builtin_sub(table);
    register_builtin_div(table);
    register_builtin_inc(table);
    register_builtin_dec(table);
    register_builtin_abs(table);
    register_builtin_mod(table);
    register_builtin_rem(table);
    register_builtin_min(table);
    register_builtin_max(table);
    register_builtin_int(table);
    register_builtin_float(table);
    register_builtin_range(table);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_src(src: &str) -> Result<Value, LispError> {
        crate::test_eval(src)
    }

    #[test]
    fn test_add_identities() {
        assert_eq!(eval_src("(+)").unwrap(), Value::Int(0));
        assert_eq!(eval_src("(*)").unwrap(), Value::Int(1));
        assert_eq!(eval_src("(+ 1 2 3)").unwrap(), Value::Int(6));
    }

    #[test]
    fn test_float_contagion() {
        assert_eq!(eval_src("(+ 1 2.5)").unwrap(), Value::Float(3.5));
        assert_eq!(eval_src("(* 2 2.0)").unwrap(), Value::Float(4.0));
    }

    #[test]
    fn test_negate_and_reciprocal() {
        assert_eq!(eval_src("(- 5)").unwrap(), Value::Int(-5));
        assert_eq!(eval_src("(/ 4)").unwrap(), Value::Float(0.25));
    }

    #[test]
    fn test_int_division_promotes() {
        assert_eq!(eval_src("(/ 10 4)").unwrap(), Value::Float(2.5));
        assert_eq!(eval_src("(/ 10 2)").unwrap(), Value::Float(5.0));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(eval_src("(/ 1 0)").is_err());
        assert!(eval_src("(mod 1 0)").is_err());
    }

    #[test]
    fn test_mod_rem_signs() {
        assert_eq!(eval_src("(mod 17 5)").unwrap(), Value::Int(2));
        assert_eq!(eval_src("(mod -7 5)").unwrap(), Value::Int(3));
        assert_eq!(eval_src("(rem -7 5)").unwrap(), Value::Int(-2));
    }

    #[test]
    fn test_min_max() {
        assert_eq!(eval_src("(min 3 1 2)").unwrap(), Value::Int(1));
        assert_eq!(eval_src("(max 3 1 2.5)").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_coercions() {
        assert_eq!(eval_src("(int 3.9)").unwrap(), Value::Int(3));
        assert_eq!(eval_src("(int \"41\")").unwrap(), Value::Int(41));
        assert_eq!(eval_src("(int \"nope\")").unwrap(), Value::Nil);
        assert_eq!(eval_src("(float 2)").unwrap(), Value::Float(2.0));
    }

    #[test]
    fn test_range() {
        assert_eq!(
            eval_src("(range 4)").unwrap(),
            Value::Vector(vec![
                Value::Int(0),
                Value::Int(1),
                Value::Int(2),
                Value::Int(3)
            ])
        );
        assert_eq!(
            eval_src("(range 2 8 3)").unwrap(),
            Value::Vector(vec![Value::Int(2), Value::Int(5)])
        );
        assert!(eval_src("(range 0 1 0)").is_err());
    }
}
