//! Type probes: nil?, number?, integer?, float?, string?, keyword?, map?,
//! vector?, set?, fn?

use crate::error::LispError;
use crate::eval::Interp;
use crate::value::Value;
use ptc_macros::builtin;

#[builtin(name = "nil?", arity = 1)]
pub fn builtin_nil_p(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::Bool(matches!(args[0], Value::Nil)))
}

#[builtin(name = "number?", arity = 1)]
pub fn builtin_number_p(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::Bool(matches!(
        args[0],
        Value::Int(_) | Value::Float(_)
    )))
}

#[builtin(name = "integer?", arity = 1)]
pub fn builtin_integer_p(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::Bool(matches!(args[0], Value::Int(_))))
}

#[builtin(name = "float?", arity = 1)]
pub fn builtin_float_p(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::Bool(matches!(args[0], Value::Float(_))))
}

#[builtin(name = "string?", arity = 1)]
pub fn builtin_string_p(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::Bool(matches!(args[0], Value::String(_))))
}

#[builtin(name = "keyword?", arity = 1)]
pub fn builtin_keyword_p(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::Bool(matches!(args[0], Value::Keyword(_))))
}

#[builtin(name = "map?", arity = 1)]
pub fn builtin_map_p(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::Bool(matches!(args[0], Value::Map(_))))
}

#[builtin(name = "vector?", arity = 1)]
pub fn builtin_vector_p(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::Bool(matches!(args[0], Value::Vector(_))))
}

#[builtin(name = "set?", arity = 1)]
pub fn builtin_set_p(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::Bool(matches!(args[0], Value::Set(_))))
}

#[builtin(name = "fn?", arity = 1)]
pub fn builtin_fn_p(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::Bool(matches!(
        args[0],
        Value::Closure(_) | Value::Builtin(_) | Value::Var(_)
    )))
}

#[builtin(name = "boolean?", arity = 1)]
pub fn builtin_boolean_p(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::Bool(matches!(args[0], Value::Bool(_))))
}

pub fn register(table: &mut super::BuiltinTable) {
    register_builtin_nil_p(table);
    register_builtin_number_p(table);
    register_builtin_integer_p(table);
    register_builtin_float_p(table);
    register_builtin_string_p(table);
    register_builtin_keyword_p(table);
    register_builtin_map_p(table);
    register_builtin_vector_p(table);
    register_builtin_set_p(table);
    register_builtin_fn_p(table);
    register_builtin_boolean_p(table);
}
