//! Termination sentinels: return, fail
//!
//! These are the only ways user code produces `Return`/`Fail` values. Once
//! produced, every enclosing form short-circuits them to the top level.

use crate::error::LispError;
use crate::eval::Interp;
use crate::value::Value;
use indexmap::IndexMap;
use ptc_macros::builtin;

#[builtin(name = "return", arities(0, 1))]
pub fn builtin_return(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let value = args.first().cloned().unwrap_or(Value::Nil);
    Ok(Value::Return(Box::new(value)))
}

/// Coerce the fail payload into a map carrying at least `:reason`.
pub fn shape_fail(value: Value) -> Value {
    match value {
        Value::Map(mut m) => {
            let has_reason = m.contains_key(&Value::keyword("reason"))
                || m.contains_key(&Value::string("reason"));
            if !has_reason {
                m.insert(Value::keyword("reason"), Value::keyword("failed"));
            }
            Value::Map(m)
        }
        other => {
            let mut m = IndexMap::new();
            m.insert(Value::keyword("reason"), Value::keyword("failed"));
            m.insert(
                Value::keyword("message"),
                Value::String(other.display_string()),
            );
            Value::Map(m)
        }
    }
}

#[builtin(name = "fail", arities(0, 1))]
pub fn builtin_fail(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let payload = args.first().cloned().unwrap_or(Value::Map(IndexMap::new()));
    Ok(Value::Fail(Box::new(shape_fail(payload))))
}

pub fn register(table: &mut super::BuiltinTable) {
    register_builtin_return(table);
    register_builtin_fail(table);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(src: &str) -> Value {
        crate::analyzer::form_to_value(&crate::parser::parse_one(src).unwrap())
    }

    #[test]
    fn test_return_wraps_value() {
        assert_eq!(
            crate::test_eval("(return 42)").unwrap(),
            Value::Return(Box::new(Value::Int(42)))
        );
        assert_eq!(
            crate::test_eval("(return)").unwrap(),
            Value::Return(Box::new(Value::Nil))
        );
    }

    #[test]
    fn test_fail_defaults_reason() {
        let out = crate::test_eval("(fail {:message \"x\"})").unwrap();
        assert_eq!(
            out,
            Value::Fail(Box::new(v("{:message \"x\", :reason :failed}")))
        );
    }

    #[test]
    fn test_fail_keeps_explicit_reason() {
        let out = crate::test_eval("(fail {:reason :bad_input :message \"x missing\"})").unwrap();
        assert_eq!(
            out,
            Value::Fail(Box::new(v("{:reason :bad_input, :message \"x missing\"}")))
        );
    }

    #[test]
    fn test_fail_coerces_non_map() {
        let out = crate::test_eval("(fail \"boom\")").unwrap();
        assert_eq!(
            out,
            Value::Fail(Box::new(v("{:reason :failed, :message \"boom\"}")))
        );
    }
}
