//! Console output: print, println
//!
//! Output is captured on the evaluation context and surfaced on the step
//! for debugging, never written to the host's stdout. Each call is bounded
//! by the configured print cap and truncated with an ellipsis past it.

use crate::error::LispError;
use crate::eval::Interp;
use crate::value::Value;
use ptc_macros::builtin;

fn render(args: &[Value]) -> String {
    args.iter()
        .map(|v| v.display_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[builtin(name = "println", variadic)]
pub fn builtin_println(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    interp.push_print(render(args));
    Ok(Value::Nil)
}

#[builtin(name = "print", variadic)]
pub fn builtin_print(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
    interp.push_print(render(args));
    Ok(Value::Nil)
}

pub fn register(table: &mut super::BuiltinTable) {
    register_builtin_println(table);
    register_builtin_print(table);
}
