// ABOUTME: LLM callback interface: request/response types, retryable error
// classes and the exponential-backoff wrapper used by the agent loop.

use crate::config::RetryPolicy;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tokens: Option<TokenUsage>,
}

/// Error classes reported by the host adapter. The first three are
/// transient and retried with backoff; everything else is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    RateLimit,
    Timeout,
    ServerError,
    Other(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimit | LlmError::Timeout | LlmError::ServerError
        )
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::RateLimit => write!(f, "rate limited"),
            LlmError::Timeout => write!(f, "request timed out"),
            LlmError::ServerError => write!(f, "server error"),
            LlmError::Other(message) => write!(f, "{}", message),
        }
    }
}

/// The only interface the core has to a language model. Vendor adapters
/// live outside this crate.
pub trait LlmCallback: Send + Sync {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

/// Call the model, retrying transient failures with exponential backoff.
pub fn call_with_retry(
    llm: &dyn LlmCallback,
    request: &ChatRequest,
    policy: &RetryPolicy,
) -> Result<ChatResponse, LlmError> {
    let mut attempt = 0;
    loop {
        match llm.complete(request) {
            Ok(response) => return Ok(response),
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.base_delay * 2u32.saturating_pow(attempt);
                tracing::warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying LLM call");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Scripted callback: pops canned responses in order. Intended for tests
/// and offline dry runs.
pub struct ScriptedCallback {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<ChatResponse, LlmError>>>,
    pub requests: std::sync::Mutex<Vec<ChatRequest>>,
}

impl ScriptedCallback {
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(responses: I) -> Self {
        ScriptedCallback {
            responses: std::sync::Mutex::new(
                responses
                    .into_iter()
                    .map(|s| {
                        Ok(ChatResponse {
                            content: s.into(),
                            tokens: Some(TokenUsage {
                                input: 100,
                                output: 50,
                            }),
                        })
                    })
                    .collect(),
            ),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_errors<I: IntoIterator<Item = Result<ChatResponse, LlmError>>>(
        responses: I,
    ) -> Self {
        ScriptedCallback {
            responses: std::sync::Mutex::new(responses.into_iter().collect()),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl LlmCallback for ScriptedCallback {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Other("script exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_retry_then_success() {
        let llm = ScriptedCallback::with_errors([
            Err(LlmError::RateLimit),
            Ok(ChatResponse {
                content: "(+ 1 2)".to_string(),
                tokens: None,
            }),
        ]);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let request = ChatRequest {
            system: String::new(),
            messages: vec![ChatMessage::user("go")],
        };
        let out = call_with_retry(&llm, &request, &policy).unwrap();
        assert_eq!(out.content, "(+ 1 2)");
        assert_eq!(llm.requests.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_terminal_error_not_retried() {
        let llm = ScriptedCallback::with_errors([Err(LlmError::Other("invalid key".into()))]);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let request = ChatRequest {
            system: String::new(),
            messages: vec![],
        };
        assert!(call_with_retry(&llm, &request, &policy).is_err());
        assert_eq!(llm.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_retry_budget_exhausts() {
        let llm = ScriptedCallback::with_errors([
            Err(LlmError::ServerError),
            Err(LlmError::ServerError),
            Err(LlmError::ServerError),
        ]);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let request = ChatRequest {
            system: String::new(),
            messages: vec![],
        };
        assert!(call_with_retry(&llm, &request, &policy).is_err());
        assert_eq!(llm.requests.lock().unwrap().len(), 3);
    }
}
