//! Logic operations: not, and the record predicate combinators
//!
//! `and`/`or` are analyzer-level short-circuit forms, not entries here.
//! `where` builds field predicates over records; `all-of`/`any-of`/`none-of`
//! combine predicate values. Empty `all-of` is true, empty `any-of` false.

use crate::analyzer::{Expr, FnDef, Pattern};
use crate::env::Env;
use crate::error::LispError;
use crate::eval::Interp;
use crate::value::{Closure, Value};
use indexmap::IndexMap;
use ptc_macros::builtin;
use std::sync::Arc;

#[builtin(name = "not", arity = 1)]
pub fn builtin_not(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::Bool(!args[0].is_truthy()))
}

/// Synthesize a one-argument closure from a body expression over `record`.
fn predicate(name: &str, body: Expr) -> Value {
    Value::Closure(Arc::new(Closure {
        def: Arc::new(FnDef {
            params: vec![Pattern::Sym("record".to_string())],
            rest: None,
            body,
            name: Some(name.to_string()),
        }),
        env: Env::new(),
        ns_snapshot: Arc::new(IndexMap::new()),
    }))
}

/// Field access expression `(:field record)`, tolerant of string spellings.
fn field_access(field: &Value) -> Result<Expr, LispError> {
    let key = match field {
        Value::Keyword(k) => Value::Keyword(k.clone()),
        Value::String(s) => Value::Keyword(s.clone()),
        other => return Err(LispError::type_error("where", "keyword", other, 1)),
    };
    Ok(Expr::Call {
        callee: Box::new(Expr::Literal(key)),
        args: vec![Expr::Local("record".to_string())],
    })
}

/// `(where :field)` — truthy-field test.
/// `(where :field op value)` — comparison predicate; `op` is one of the
/// comparison builtins (`= != < <= > >=`).
#[builtin(name = "where", arities(1, 3))]
pub fn builtin_where(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let access = field_access(&args[0])?;
    let body = if args.len() == 1 {
        Expr::If(
            Box::new(access),
            Box::new(Expr::Literal(Value::Bool(true))),
            Box::new(Expr::Literal(Value::Bool(false))),
        )
    } else {
        let op = args[1].clone();
        if !matches!(op, Value::Builtin(_) | Value::Closure(_) | Value::Keyword(_)) {
            return Err(LispError::type_error("where", "comparison function", &op, 2));
        }
        Expr::Call {
            callee: Box::new(Expr::Literal(op)),
            args: vec![access, Expr::Literal(args[2].clone())],
        }
    };
    Ok(predicate("where-pred", body))
}

fn combined(
    name: &str,
    preds: &[Value],
    on_match: Value,
    on_miss: Value,
    any_mode: bool,
) -> Result<Value, LispError> {
    for (i, p) in preds.iter().enumerate() {
        if !matches!(p, Value::Builtin(_) | Value::Closure(_) | Value::Keyword(_)) {
            return Err(LispError::type_error(name, "predicate", p, i + 1));
        }
    }
    let calls: Vec<Expr> = preds
        .iter()
        .map(|p| Expr::Call {
            callee: Box::new(Expr::Literal(p.clone())),
            args: vec![Expr::Local("record".to_string())],
        })
        .collect();
    let test = if any_mode {
        Expr::Or(calls)
    } else {
        Expr::And(calls)
    };
    let body = Expr::If(
        Box::new(test),
        Box::new(Expr::Literal(on_match)),
        Box::new(Expr::Literal(on_miss)),
    );
    Ok(predicate(name, body))
}

#[builtin(name = "all-of", variadic)]
pub fn builtin_all_of(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    combined("all-of", args, Value::Bool(true), Value::Bool(false), false)
}

#[builtin(name = "any-of", variadic)]
pub fn builtin_any_of(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    combined("any-of", args, Value::Bool(true), Value::Bool(false), true)
}

#[builtin(name = "none-of", variadic)]
pub fn builtin_none_of(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    combined("none-of", args, Value::Bool(false), Value::Bool(true), true)
}

pub fn register(table: &mut super::BuiltinTable) {
    register_builtin_not(table);
    register_builtin_where(table);
    register_builtin_all_of(table);
    register_builtin_any_of(table);
    register_builtin_none_of(table);
}

#[cfg(test)]
mod tests {
    use crate::value::Value;

    fn eval_src(src: &str) -> Value {
        crate::test_eval(src).unwrap()
    }

    #[test]
    fn test_not() {
        assert_eq!(eval_src("(not nil)"), Value::Bool(true));
        assert_eq!(eval_src("(not 0)"), Value::Bool(false));
    }

    #[test]
    fn test_where_comparison() {
        assert_eq!(eval_src("((where :price > 500) {:price 600})"), Value::Bool(true));
        assert_eq!(eval_src("((where :price > 500) {:price 100})"), Value::Bool(false));
        assert_eq!(eval_src("((where :status = \"open\") {:status \"open\"})"), Value::Bool(true));
        assert_eq!(eval_src("((where :n != 1) {:n 2})"), Value::Bool(true));
    }

    #[test]
    fn test_where_truthy_mode() {
        assert_eq!(eval_src("((where :active) {:active true})"), Value::Bool(true));
        assert_eq!(eval_src("((where :active) {:active false})"), Value::Bool(false));
        assert_eq!(eval_src("((where :active) {})"), Value::Bool(false));
    }

    #[test]
    fn test_where_reads_string_keys() {
        assert_eq!(eval_src("((where :price > 5) {\"price\" 10})"), Value::Bool(true));
    }

    #[test]
    fn test_combinators() {
        let src = "((all-of (where :a > 1) (where :b > 1)) {:a 2 :b 2})";
        assert_eq!(eval_src(src), Value::Bool(true));
        let src = "((all-of (where :a > 1) (where :b > 1)) {:a 2 :b 0})";
        assert_eq!(eval_src(src), Value::Bool(false));
        let src = "((any-of (where :a > 1) (where :b > 1)) {:a 0 :b 2})";
        assert_eq!(eval_src(src), Value::Bool(true));
        let src = "((none-of (where :a > 1)) {:a 0})";
        assert_eq!(eval_src(src), Value::Bool(true));
    }

    #[test]
    fn test_empty_combinators() {
        assert_eq!(eval_src("((all-of) {:a 1})"), Value::Bool(true));
        assert_eq!(eval_src("((any-of) {:a 1})"), Value::Bool(false));
        assert_eq!(eval_src("((none-of) {:a 1})"), Value::Bool(true));
    }
}
