// ABOUTME: Error types for the PTC-Lisp runtime, sandbox and agent loop

use crate::value::Value;
use serde::Serialize;
use thiserror::Error;

// ===== Arity constant strings (eliminates allocations in error paths) =====
pub const ARITY_ONE: &str = "1";
pub const ARITY_TWO: &str = "2";
pub const ARITY_THREE: &str = "3";
pub const ARITY_AT_LEAST_ONE: &str = "at least 1";
pub const ARITY_ONE_OR_TWO: &str = "1-2";
pub const ARITY_TWO_OR_THREE: &str = "2-3";

/// Closed set of error kinds crossing the core boundary. Nothing else leaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParseError,
    AnalysisError,
    ArityError,
    TypeError,
    NotCallable,
    ToolError,
    LoopLimitExceeded,
    Timeout,
    MemoryExceeded,
    ValidationError,
    NoCodeFound,
    LlmError,
    MaxTurnsExceeded,
    TurnBudgetExhausted,
    MissionTimeout,
    ChainedFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ParseError => "parse_error",
            ErrorKind::AnalysisError => "analysis_error",
            ErrorKind::ArityError => "arity_error",
            ErrorKind::TypeError => "type_error",
            ErrorKind::NotCallable => "not_callable",
            ErrorKind::ToolError => "tool_error",
            ErrorKind::LoopLimitExceeded => "loop_limit_exceeded",
            ErrorKind::Timeout => "timeout",
            ErrorKind::MemoryExceeded => "memory_exceeded",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::NoCodeFound => "no_code_found",
            ErrorKind::LlmError => "llm_error",
            ErrorKind::MaxTurnsExceeded => "max_turns_exceeded",
            ErrorKind::TurnBudgetExhausted => "turn_budget_exhausted",
            ErrorKind::MissionTimeout => "mission_timeout",
            ErrorKind::ChainedFailure => "chained_failure",
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum LispError {
    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("unbound symbol: {0}")]
    UnboundVar(String),

    #[error("bad destructuring form: {message}")]
    BadDestructure { message: String },

    #[error("analysis error: {message}")]
    Analysis { message: String },

    /// Arity error with function name, expected count/range, and actual count
    #[error("{function}: expected {expected} argument{}, got {actual}", if *.expected == "1" { "" } else { "s" })]
    Arity {
        function: String,
        expected: String, // "2", "1-2", "at least 1"
        actual: usize,
    },

    /// Type mismatch with function name, expected type, actual type, position
    #[error("{function}: expected {expected}, got {actual} at argument {position}")]
    Type {
        function: String,
        expected: String,
        actual: String,
        position: usize,
    },

    /// Runtime error with function context
    #[error("{function}: {message}")]
    Runtime { function: String, message: String },

    #[error("value of type {actual} is not callable")]
    NotCallable { actual: String },

    #[error("tool/{name}: {message}")]
    Tool { name: String, message: String },

    #[error("loop limit of {limit} call evaluations exceeded")]
    LoopLimit { limit: u64 },

    #[error("execution timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("heap ceiling exceeded: {bytes} bytes")]
    MemoryExceeded { bytes: usize },

    #[error("validation error at {path}: expected {expected}, got {actual}")]
    Validation {
        path: String,
        expected: String,
        actual: String,
        /// true when the input context failed validation (fatal), false when
        /// the return value did (fed back)
        on_input: bool,
    },

    #[error("no code found in LLM response")]
    NoCodeFound,

    #[error("LLM error: {message}")]
    Llm { message: String },

    #[error("max turns ({0}) exceeded")]
    MaxTurnsExceeded(u32),

    #[error("turn token budget exhausted")]
    TurnBudgetExhausted,

    #[error("mission timed out after {ms}ms")]
    MissionTimeout { ms: u64 },

    #[error("upstream step failed: {message}")]
    ChainedFailure { message: String },
}

impl LispError {
    /// Create a type mismatch error with full context
    pub fn type_error(function: &str, expected: &str, actual: &Value, position: usize) -> Self {
        LispError::Type {
            function: function.to_string(),
            expected: expected.to_string(),
            actual: actual.type_name().to_string(),
            position,
        }
    }

    /// Create an arity error with expected and actual counts
    pub fn arity_error(function: &str, expected: impl Into<String>, actual: usize) -> Self {
        LispError::Arity {
            function: function.to_string(),
            expected: expected.into(),
            actual,
        }
    }

    /// Create a runtime error with function context
    pub fn runtime_error(function: &str, message: impl Into<String>) -> Self {
        LispError::Runtime {
            function: function.to_string(),
            message: message.into(),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        LispError::Parse {
            message: message.into(),
        }
    }

    pub fn analysis_error(message: impl Into<String>) -> Self {
        LispError::Analysis {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LispError::Parse { .. } => ErrorKind::ParseError,
            LispError::UnboundVar(_)
            | LispError::BadDestructure { .. }
            | LispError::Analysis { .. } => ErrorKind::AnalysisError,
            LispError::Arity { .. } => ErrorKind::ArityError,
            LispError::Type { .. } | LispError::Runtime { .. } => ErrorKind::TypeError,
            LispError::NotCallable { .. } => ErrorKind::NotCallable,
            LispError::Tool { .. } => ErrorKind::ToolError,
            LispError::LoopLimit { .. } => ErrorKind::LoopLimitExceeded,
            LispError::Timeout { .. } => ErrorKind::Timeout,
            LispError::MemoryExceeded { .. } => ErrorKind::MemoryExceeded,
            LispError::Validation { .. } => ErrorKind::ValidationError,
            LispError::NoCodeFound => ErrorKind::NoCodeFound,
            LispError::Llm { .. } => ErrorKind::LlmError,
            LispError::MaxTurnsExceeded(_) => ErrorKind::MaxTurnsExceeded,
            LispError::TurnBudgetExhausted => ErrorKind::TurnBudgetExhausted,
            LispError::MissionTimeout { .. } => ErrorKind::MissionTimeout,
            LispError::ChainedFailure { .. } => ErrorKind::ChainedFailure,
        }
    }

    /// Kinds that terminate a mission outright. Everything else becomes
    /// textual feedback for the next turn, capped by `retry_turns`.
    pub fn is_fatal(&self) -> bool {
        match self {
            LispError::Timeout { .. }
            | LispError::MemoryExceeded { .. }
            | LispError::Llm { .. }
            | LispError::MaxTurnsExceeded(_)
            | LispError::TurnBudgetExhausted
            | LispError::MissionTimeout { .. }
            | LispError::ChainedFailure { .. } => true,
            LispError::Validation { on_input, .. } => *on_input,
            _ => false,
        }
    }

    /// Short single-line rendering fed back to the LLM on retryable errors.
    pub fn feedback_line(&self) -> String {
        format!("{}", self)
    }
}
