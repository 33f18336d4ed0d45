// ABOUTME: PTC-Lisp: a sandboxed Clojure-subset interpreter and agent loop
// for programs emitted by an LLM and executed against host data and tools.

pub mod agent;
pub mod analyzer;
pub mod builtins;
pub mod config;
pub mod env;
pub mod error;
pub mod eval;
pub mod extract;
pub mod llm;
pub mod memory;
pub mod parser;
pub mod prompt;
pub mod sandbox;
pub mod signature;
pub mod tools;
pub mod value;

use analyzer::Expr;
use std::sync::Arc;

pub use agent::{FailInfo, Step, SubAgent, TurnRecord, Usage};
pub use config::{AgentConfig, MemoryStrategy, RetryPolicy, SandboxOptions};
pub use error::{ErrorKind, LispError};
pub use llm::{ChatMessage, ChatRequest, ChatResponse, LlmCallback, LlmError, TokenUsage};
pub use sandbox::{execute, Execution, Metrics, Sentinel};
pub use signature::{parse_signature, parse_type, Signature};
pub use tools::{SimpleExecutor, ToolCallRecord, ToolDef, ToolExecutor, ToolSet};
pub use value::Value;

/// A parsed and analyzed program, ready for repeated sandboxed execution.
#[derive(Debug, Clone)]
pub struct Program {
    pub ast: Arc<Expr>,
    pub source: String,
}

/// Sanitize, parse and analyze source into a `Program`.
pub fn compile(source: &str) -> Result<Program, LispError> {
    let forms = parser::parse(source)?;
    let ast = analyzer::analyze_program(&forms)?;
    Ok(Program {
        ast: Arc::new(ast),
        source: source.to_string(),
    })
}

/// Evaluate one source program with default options and no host inputs.
/// Test helper shared by the builtin test modules.
#[cfg(test)]
pub(crate) fn test_eval(src: &str) -> Result<Value, LispError> {
    use env::Env;
    use indexmap::IndexMap;

    let program = compile(src)?;
    let ctx = IndexMap::new();
    let memory = IndexMap::new();
    let history = Vec::new();
    let opts = SandboxOptions::default();
    let toolset = ToolSet::new();
    let mut interp = eval::Interp::new(&ctx, &memory, &history, None, &toolset, &opts, None);
    interp.eval(&program.ast, &Env::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_rejects_bad_source() {
        assert!(matches!(
            compile("(unknown-thing 1)").unwrap_err(),
            LispError::UnboundVar(_)
        ));
        assert!(matches!(
            compile("(+ 1").unwrap_err(),
            LispError::Parse { .. }
        ));
    }

    #[test]
    fn test_compile_and_eval() {
        assert_eq!(test_eval("(+ 1 2)").unwrap(), Value::Int(3));
    }
}
