//! String operations
//!
//! `str` concatenates with the display printer (strings bare, everything
//! else canonical). Regex helpers compile their pattern per call; malformed
//! patterns are runtime errors, not panics.

use super::{as_int, as_string, seq_items};
use crate::error::LispError;
use crate::eval::Interp;
use crate::value::Value;
use ptc_macros::builtin;

#[builtin(name = "str", variadic)]
pub fn builtin_str(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let mut out = String::new();
    for arg in args {
        if matches!(arg, Value::Nil) {
            continue;
        }
        out.push_str(&arg.display_string());
    }
    let v = Value::String(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

/// `(str-join sep coll)` or `(str-join coll)`.
#[builtin(name = "str-join", arities(1, 2))]
pub fn builtin_str_join(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let (sep, coll) = if args.len() == 2 {
        (as_string("str-join", &args[0], 1)?.to_string(), &args[1])
    } else {
        (String::new(), &args[0])
    };
    let items = seq_items("str-join", coll, args.len())?;
    let parts: Vec<String> = items.iter().map(|v| v.display_string()).collect();
    let v = Value::String(parts.join(&sep));
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "split", arity = 2)]
pub fn builtin_split(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let s = as_string("split", &args[0], 1)?;
    let sep = as_string("split", &args[1], 2)?;
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        s.split(sep).map(Value::string).collect()
    };
    let v = Value::Vector(parts);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "split-lines", arity = 1)]
pub fn builtin_split_lines(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let s = as_string("split-lines", &args[0], 1)?;
    let v = Value::Vector(s.lines().map(Value::string).collect());
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "trim", arity = 1)]
pub fn builtin_trim(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::string(as_string("trim", &args[0], 1)?.trim()))
}

#[builtin(name = "lower-case", arity = 1)]
pub fn builtin_lower_case(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::string(
        as_string("lower-case", &args[0], 1)?.to_lowercase(),
    ))
}

#[builtin(name = "upper-case", arity = 1)]
pub fn builtin_upper_case(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    Ok(Value::string(
        as_string("upper-case", &args[0], 1)?.to_uppercase(),
    ))
}

/// `(subs s start)` / `(subs s start end)`, on character positions.
#[builtin(name = "subs", arities(2, 3))]
pub fn builtin_subs(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let s = as_string("subs", &args[0], 1)?;
    let chars: Vec<char> = s.chars().collect();
    let start = as_int("subs", &args[1], 2)?;
    let end = match args.get(2) {
        Some(v) => as_int("subs", v, 3)?,
        None => chars.len() as i64,
    };
    if start < 0 || end < start || end > chars.len() as i64 {
        return Err(LispError::runtime_error(
            "subs",
            format!("index range {}..{} out of bounds for length {}", start, end, chars.len()),
        ));
    }
    Ok(Value::String(
        chars[start as usize..end as usize].iter().collect(),
    ))
}

fn compile_regex(function: &str, pattern: &str) -> Result<regex::Regex, LispError> {
    regex::Regex::new(pattern)
        .map_err(|e| LispError::runtime_error(function, format!("invalid pattern: {}", e)))
}

fn match_value(caps: &regex::Captures) -> Value {
    if caps.len() == 1 {
        return Value::string(&caps[0]);
    }
    let groups: Vec<Value> = (0..caps.len())
        .map(|i| match caps.get(i) {
            Some(m) => Value::string(m.as_str()),
            None => Value::Nil,
        })
        .collect();
    Value::Vector(groups)
}

/// First regex match: the match string, or `[full groups…]` when the
/// pattern captures, or nil.
#[builtin(name = "re-find", arity = 2)]
pub fn builtin_re_find(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let pattern = as_string("re-find", &args[0], 1)?;
    let s = as_string("re-find", &args[1], 2)?;
    let re = compile_regex("re-find", pattern)?;
    Ok(match re.captures(s) {
        Some(caps) => match_value(&caps),
        None => Value::Nil,
    })
}

/// All regex matches, in order.
#[builtin(name = "re-seq", arity = 2)]
pub fn builtin_re_seq(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let pattern = as_string("re-seq", &args[0], 1)?;
    let s = as_string("re-seq", &args[1], 2)?;
    let re = compile_regex("re-seq", pattern)?;
    let out: Vec<Value> = re.captures_iter(s).map(|c| match_value(&c)).collect();
    let v = Value::Vector(out);
    interp.charge(v.heap_cost())?;
    Ok(v)
}

#[builtin(name = "starts-with?", arity = 2)]
pub fn builtin_starts_with_p(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let s = as_string("starts-with?", &args[0], 1)?;
    let prefix = as_string("starts-with?", &args[1], 2)?;
    Ok(Value::Bool(s.starts_with(prefix)))
}

#[builtin(name = "ends-with?", arity = 2)]
pub fn builtin_ends_with_p(_interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    let s = as_string("ends-with?", &args[0], 1)?;
    let suffix = as_string("ends-with?", &args[1], 2)?;
    Ok(Value::Bool(s.ends_with(suffix)))
}

pub fn register(table: &mut super::BuiltinTable) {
    register_builtin_str(table);
    register_builtin_str_join(table);
    register_builtin_split(table);
    register_builtin_split_lines(table);
    register_builtin_trim(table);
    register_builtin_lower_case(table);
    register_builtin_upper_case(table);
    register_builtin_subs(table);
    register_builtin_re_find(table);
    register_builtin_re_seq(table);
    register_builtin_starts_with_p(table);
    register_builtin_ends_with_p(table);
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
    fn test_str_concatenation() {
        assert_eq!(eval_src("(str \"a\" 1 :k [2])"), v("\"a1:k[2]\""));
        assert_eq!(eval_src("(str)"), v("\"\""));
        assert_eq!(eval_src("(str nil \"x\")"), v("\"x\""));
    }

    #[test]
    fn test_join_and_split() {
        assert_eq!(eval_src("(str-join \",\" [\"a\" \"b\"])"), v("\"a,b\""));
        assert_eq!(eval_src("(str-join [1 2 3])"), v("\"123\""));
        assert_eq!(eval_src("(split \"a,b,c\" \",\")"), v("[\"a\" \"b\" \"c\"]"));
        assert_eq!(eval_src("(split-lines \"a\\nb\")"), v("[\"a\" \"b\"]"));
    }

    #[test]
    fn test_case_and_trim() {
        assert_eq!(eval_src("(trim \"  x  \")"), v("\"x\""));
        assert_eq!(eval_src("(upper-case \"ab\")"), v("\"AB\""));
        assert_eq!(eval_src("(lower-case \"AB\")"), v("\"ab\""));
    }

    #[test]
    fn test_subs() {
        assert_eq!(eval_src("(subs \"hello\" 1 3)"), v("\"el\""));
        assert_eq!(eval_src("(subs \"hello\" 2)"), v("\"llo\""));
        assert!(crate::test_eval("(subs \"hi\" 0 5)").is_err());
    }

    #[test]
    fn test_regex() {
        assert_eq!(eval_src("(re-find \"\\\\d+\" \"a12b34\")"), v("\"12\""));
        assert_eq!(eval_src("(re-find \"z+\" \"abc\")"), Value::Nil);
        assert_eq!(
            eval_src("(re-seq \"\\\\d+\" \"a12b34\")"),
            v("[\"12\" \"34\"]")
        );
        assert_eq!(
            eval_src("(re-find \"(a)(b)\" \"ab\")"),
            v("[\"ab\" \"a\" \"b\"]")
        );
        assert!(crate::test_eval("(re-find \"(\" \"x\")").is_err());
    }

    #[test]
    fn test_predicates() {
        assert_eq!(eval_src("(starts-with? \"hello\" \"he\")"), Value::Bool(true));
        assert_eq!(eval_src("(ends-with? \"hello\" \"lo\")"), Value::Bool(true));
    }
}
