// ABOUTME: SubAgent: the LLM↔runtime turn loop
// Assembles prompts, extracts and evaluates programs, accumulates memory,
// and terminates on sentinels or budget exhaustion.

use crate::config::AgentConfig;
use crate::error::LispError;
use crate::extract::extract_code;
use crate::llm::{call_with_retry, ChatMessage, ChatRequest, LlmCallback};
use crate::prompt::{assemble_system, assemble_user, expand_template, PromptTemplates};
use crate::sandbox::{self, Sentinel};
use crate::signature::Signature;
use crate::tools::{ToolCallRecord, ToolExecutor, ToolSet};
use crate::value::{flex_lookup, Value};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Structured failure surfaced on a `Step`.
#[derive(Debug, Clone, Serialize)]
pub struct FailInfo {
    pub reason: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Usage {
    pub duration_ms: u64,
    pub memory_bytes: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub turns: u32,
}

/// One turn of the trace: raw response, extracted code, evaluation result.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord {
    pub turn: u32,
    pub response: String,
    pub code: Option<String>,
    pub value: Option<Value>,
    pub error: Option<String>,
    pub prints: Vec<String>,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// The structured result of one mission (or one program execution).
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    #[serde(rename = "return")]
    pub return_value: Option<Value>,
    pub fail: Option<FailInfo>,
    pub memory: IndexMap<String, Value>,
    pub memory_delta: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub usage: Usage,
    pub turns: u32,
    /// full conversation, when one took place
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    pub trace: Vec<TurnRecord>,
}

impl Step {
    pub fn is_ok(&self) -> bool {
        self.fail.is_none()
    }

    fn with_messages(mut self, messages: Vec<ChatMessage>) -> Step {
        self.messages = Some(messages);
        self
    }
}

/// Loop state, for telemetry. Terminal states are `DoneOk` and `DoneFail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Idle,
    Assembling,
    AwaitingLlm,
    Extracting,
    Evaluating,
    Continue,
    DoneOk,
    DoneFail,
}

pub struct SubAgent {
    mission: String,
    signature: Option<Signature>,
    tools: ToolSet,
    executor: Option<Arc<dyn ToolExecutor>>,
    config: AgentConfig,
    templates: PromptTemplates,
}

impl SubAgent {
    pub fn new(mission: impl Into<String>) -> Self {
        SubAgent {
            mission: mission.into(),
            signature: None,
            tools: ToolSet::new(),
            executor: None,
            config: AgentConfig::default(),
            templates: PromptTemplates::default(),
        }
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn with_tools(mut self, tools: ToolSet, executor: Arc<dyn ToolExecutor>) -> Self {
        self.tools = tools;
        self.executor = Some(executor);
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Run a mission after an upstream step; a failed upstream
    /// short-circuits without calling the LLM at all.
    pub fn run_after(
        &self,
        upstream: &Step,
        llm: &dyn LlmCallback,
        ctx: IndexMap<String, Value>,
        memory: Option<IndexMap<String, Value>>,
        history: Vec<Value>,
    ) -> Step {
        if let Some(fail) = &upstream.fail {
            let mut details = IndexMap::new();
            details.insert(Value::keyword("reason"), Value::string(&fail.reason));
            details.insert(Value::keyword("message"), Value::string(&fail.message));
            return Step {
                return_value: None,
                fail: Some(FailInfo {
                    reason: "chained_failure".to_string(),
                    message: format!("upstream step failed: {}", fail.reason),
                    details: Some(Value::Map(details)),
                }),
                memory: memory.unwrap_or_default(),
                memory_delta: IndexMap::new(),
                signature: self.signature.as_ref().map(|s| s.raw.clone()),
                usage: Usage::default(),
                turns: 0,
                messages: None,
                trace: Vec::new(),
            };
        }
        self.run(llm, ctx, memory, history)
    }

    /// Drive the mission to completion.
    pub fn run(
        &self,
        llm: &dyn LlmCallback,
        ctx: IndexMap<String, Value>,
        memory: Option<IndexMap<String, Value>>,
        history: Vec<Value>,
    ) -> Step {
        let started = Instant::now();
        let mut memory = memory.unwrap_or_default();
        let mut ring: Vec<Value> = history.into_iter().take(3).collect();
        let mut trace: Vec<TurnRecord> = Vec::new();
        let mut usage = Usage::default();
        let mut state = TurnState::Idle;
        tracing::debug!(?state, mission = %self.mission, "mission start");

        if let Some(sig) = &self.signature {
            if let Err(e) = sig.validate_input(&ctx) {
                return self.finish_err(e, memory, trace, usage, started);
            }
        }

        let single_shot = self.config.max_turns == 1 && self.tools.is_empty();
        let system = assemble_system(&self.templates, single_shot);
        let mission = expand_template(&self.mission, &ctx);
        let must_return_from = self
            .config
            .max_turns
            .saturating_sub(self.config.retry_turns)
            .max(1);

        let mut conversation: Vec<ChatMessage> = Vec::new();
        let mut feedback: Option<String> = None;
        let mut consecutive_errors: u32 = 0;

        for turn in 1..=self.config.max_turns {
            if started.elapsed() > self.config.mission_timeout {
                let e = LispError::MissionTimeout {
                    ms: self.config.mission_timeout.as_millis() as u64,
                };
                return self
                    .finish_err(e, memory, trace, usage, started)
                    .with_messages(conversation);
            }

            state = TurnState::Assembling;
            tracing::debug!(turn, ?state, "agent turn");
            let mut turn_feedback = feedback.take();
            if !single_shot && turn >= must_return_from && turn > 1 {
                turn_feedback = Some(match turn_feedback {
                    Some(f) => format!("{}\n\n{}", f, self.templates.must_return),
                    None => self.templates.must_return.clone(),
                });
            }
            let user = assemble_user(
                &ctx,
                &self.tools,
                self.signature.as_ref(),
                &mission,
                turn_feedback.as_deref(),
                self.config.sample_budget,
            );
            conversation.push(ChatMessage::user(user));

            state = TurnState::AwaitingLlm;
            tracing::debug!(turn, ?state, "agent turn");
            let request = ChatRequest {
                system: system.clone(),
                messages: conversation.clone(),
            };
            let response = match call_with_retry(llm, &request, &self.config.llm_retry) {
                Ok(r) => r,
                Err(e) => {
                    let e = LispError::Llm {
                        message: e.to_string(),
                    };
                    return self
                        .finish_err(e, memory, trace, usage, started)
                        .with_messages(conversation);
                }
            };
            usage.turns += 1;
            if let Some(tokens) = response.tokens {
                usage.input_tokens += tokens.input as u64;
                usage.output_tokens += tokens.output as u64;
            }
            conversation.push(ChatMessage::assistant(&response.content));

            if let Some(budget) = self.config.turn_budget {
                if usage.input_tokens + usage.output_tokens > budget {
                    return self
                        .finish_err(LispError::TurnBudgetExhausted, memory, trace, usage, started)
                        .with_messages(conversation);
                }
            }

            state = TurnState::Extracting;
            tracing::debug!(turn, ?state, "agent turn");
            let code = match extract_code(&response.content) {
                Some(code) => code,
                None => {
                    trace.push(TurnRecord {
                        turn,
                        response: response.content.clone(),
                        code: None,
                        value: None,
                        error: Some(LispError::NoCodeFound.to_string()),
                        prints: Vec::new(),
                        tool_calls: Vec::new(),
                    });
                    consecutive_errors += 1;
                    if consecutive_errors > self.config.retry_turns
                        || turn == self.config.max_turns
                    {
                        return self
                            .finish_err(LispError::NoCodeFound, memory, trace, usage, started)
                            .with_messages(conversation);
                    }
                    feedback = Some(self.error_feedback(&LispError::NoCodeFound));
                    continue;
                }
            };

            state = TurnState::Evaluating;
            tracing::debug!(turn, ?state, "agent turn");
            let outcome = crate::compile(&code).and_then(|program| {
                sandbox::execute(
                    &program,
                    &ctx,
                    &memory,
                    &ring,
                    self.executor.clone(),
                    &self.tools,
                    &self.config.sandbox,
                )
            });

            let execution = match outcome {
                Ok(execution) => execution,
                Err(e) => {
                    trace.push(TurnRecord {
                        turn,
                        response: response.content.clone(),
                        code: Some(code),
                        value: None,
                        error: Some(e.to_string()),
                        prints: Vec::new(),
                        tool_calls: Vec::new(),
                    });
                    consecutive_errors += 1;
                    if e.is_fatal()
                        || consecutive_errors > self.config.retry_turns
                        || turn == self.config.max_turns
                    {
                        return self
                            .finish_err(e, memory, trace, usage, started)
                            .with_messages(conversation);
                    }
                    feedback = Some(self.error_feedback(&e));
                    continue;
                }
            };

            usage.memory_bytes = usage.memory_bytes.max(execution.metrics.heap_bytes);
            trace.push(TurnRecord {
                turn,
                response: response.content.clone(),
                code: Some(code),
                value: Some(execution.value.clone()),
                error: execution
                    .fail
                    .as_ref()
                    .map(|f| format!("fail: {}", f.display_string())),
                prints: execution.prints.clone(),
                tool_calls: execution.tool_calls.clone(),
            });
            memory = execution.memory.clone();

            match execution.sentinel {
                Sentinel::Fail => {
                    state = TurnState::DoneFail;
                    tracing::debug!(turn, ?state, "agent done");
                    let fail_map = execution.fail.unwrap_or(Value::Nil);
                    return Step {
                        return_value: None,
                        fail: Some(fail_info_from_map(&fail_map)),
                        memory,
                        memory_delta: execution.memory_delta,
                        signature: self.signature.as_ref().map(|s| s.raw.clone()),
                        usage: finish_usage(usage, started),
                        turns: usage.turns,
                        messages: Some(conversation),
                        trace,
                    };
                }
                Sentinel::Return => {
                    match self.check_return(&execution.value) {
                        Ok(()) => {
                            state = TurnState::DoneOk;
                            tracing::debug!(turn, ?state, "agent done");
                            return Step {
                                return_value: Some(execution.value),
                                fail: None,
                                memory,
                                memory_delta: execution.memory_delta,
                                signature: self.signature.as_ref().map(|s| s.raw.clone()),
                                usage: finish_usage(usage, started),
                                turns: usage.turns,
                                messages: Some(conversation),
                                trace,
                            };
                        }
                        Err(e) => {
                            consecutive_errors += 1;
                            if consecutive_errors > self.config.retry_turns
                                || turn == self.config.max_turns
                            {
                                return self
                                    .finish_err(e, memory, trace, usage, started)
                                    .with_messages(conversation);
                            }
                            feedback = Some(self.error_feedback(&e));
                            continue;
                        }
                    }
                }
                Sentinel::None => {
                    if single_shot {
                        // the program's value is the answer
                        match self.check_return(&execution.value) {
                            Ok(()) => {
                                return Step {
                                    return_value: Some(execution.value),
                                    fail: None,
                                    memory,
                                    memory_delta: execution.memory_delta,
                                    signature: self.signature.as_ref().map(|s| s.raw.clone()),
                                    usage: finish_usage(usage, started),
                                    turns: usage.turns,
                                    messages: Some(conversation),
                                    trace,
                                };
                            }
                            Err(e) => {
                                return self
                                    .finish_err(e, memory, trace, usage, started)
                                    .with_messages(conversation)
                            }
                        }
                    }
                    state = TurnState::Continue;
                    tracing::debug!(turn, ?state, "agent continue");
                    consecutive_errors = 0;
                    let shown = execution.value.truncated(self.config.sample_budget);
                    let mut note = format!("Your last program evaluated to: {}", shown);
                    if execution.memory_rolled_back {
                        note.push_str(
                            "\nWarning: the memory limit was exceeded; this turn's memory \
                             delta was discarded.",
                        );
                    }
                    note.push_str(
                        "\nContinue. Call (return value) when you have the final answer.",
                    );
                    feedback = Some(note);
                    ring.insert(0, truncate_value(&execution.value, self.config.sample_budget));
                    ring.truncate(3);
                }
            }
        }

        self.finish_err(
            LispError::MaxTurnsExceeded(self.config.max_turns),
            memory,
            trace,
            usage,
            started,
        )
        .with_messages(conversation)
    }

    fn check_return(&self, value: &Value) -> Result<(), LispError> {
        match &self.signature {
            Some(sig) => sig.validate_return(value),
            None => Ok(()),
        }
    }

    fn error_feedback(&self, e: &LispError) -> String {
        let mut vars = IndexMap::new();
        vars.insert("error".to_string(), Value::string(e.feedback_line()));
        expand_template(&self.templates.retry_feedback, &vars)
    }

    fn finish_err(
        &self,
        e: LispError,
        memory: IndexMap<String, Value>,
        trace: Vec<TurnRecord>,
        usage: Usage,
        started: Instant,
    ) -> Step {
        tracing::debug!(error = %e, "agent done (fail)");
        Step {
            return_value: None,
            fail: Some(FailInfo {
                reason: e.kind().as_str().to_string(),
                message: e.to_string(),
                details: None,
            }),
            memory,
            memory_delta: IndexMap::new(),
            signature: self.signature.as_ref().map(|s| s.raw.clone()),
            usage: finish_usage(usage, started),
            turns: usage.turns,
            messages: None,
            trace,
        }
    }
}

fn finish_usage(mut usage: Usage, started: Instant) -> Usage {
    usage.duration_ms = started.elapsed().as_millis() as u64;
    usage
}

/// Values entering the turn-history ring are truncated by the sample
/// budget; an oversized value is replaced by its clipped printed form.
fn truncate_value(value: &Value, budget: usize) -> Value {
    let printed = value.print_string();
    if printed.chars().count() <= budget {
        value.clone()
    } else {
        Value::String(value.truncated(budget))
    }
}

fn fail_info_from_map(fail: &Value) -> FailInfo {
    let (reason, message, details) = match fail {
        Value::Map(m) => {
            let reason = flex_lookup(m, &Value::keyword("reason"))
                .map(|v| v.display_string())
                .unwrap_or_else(|| "failed".to_string());
            let message = flex_lookup(m, &Value::keyword("message"))
                .map(|v| v.display_string())
                .unwrap_or_default();
            (reason, message, Some(fail.clone()))
        }
        other => ("failed".to_string(), other.display_string(), None),
    };
    FailInfo {
        reason: reason.trim_start_matches(':').to_string(),
        message,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedCallback;

    fn ctx(entries: &[(&str, &str)]) -> IndexMap<String, Value> {
        entries
            .iter()
            .map(|(k, src)| {
                (
                    k.to_string(),
                    crate::analyzer::form_to_value(&crate::parser::parse_one(src).unwrap()),
                )
            })
            .collect()
    }

    #[test]
    fn test_single_shot_takes_value_as_answer() {
        let agent = SubAgent::new("Count the products.").with_config(AgentConfig {
            max_turns: 1,
            ..Default::default()
        });
        let llm = ScriptedCallback::new(["```clojure\n(count ctx/products)\n```"]);
        let step = agent.run(
            &llm,
            ctx(&[("products", "[{:price 100} {:price 600}]")]),
            None,
            vec![],
        );
        assert!(step.is_ok(), "unexpected fail: {:?}", step.fail);
        assert_eq!(step.return_value, Some(Value::Int(2)));
        assert_eq!(step.turns, 1);
    }

    #[test]
    fn test_fail_sentinel_terminates() {
        let agent = SubAgent::new("Do something.");
        let llm = ScriptedCallback::new([
            "```clojure\n(fail {:reason :bad_input :message \"x missing\"})\n```",
        ]);
        let step = agent.run(&llm, IndexMap::new(), None, vec![]);
        let fail = step.fail.unwrap();
        assert_eq!(fail.reason, "bad_input");
        assert_eq!(fail.message, "x missing");
    }

    #[test]
    fn test_chained_failure_short_circuits() {
        let agent = SubAgent::new("Next step.");
        let upstream = Step {
            return_value: None,
            fail: Some(FailInfo {
                reason: "timeout".to_string(),
                message: "boom".to_string(),
                details: None,
            }),
            memory: IndexMap::new(),
            memory_delta: IndexMap::new(),
            signature: None,
            usage: Usage::default(),
            turns: 1,
            messages: None,
            trace: Vec::new(),
        };
        let llm = ScriptedCallback::new(["```clojure\n(+ 1 1)\n```"]);
        let step = agent.run_after(&upstream, &llm, IndexMap::new(), None, vec![]);
        assert_eq!(step.fail.unwrap().reason, "chained_failure");
        // the LLM was never called
        assert!(llm.requests.lock().unwrap().is_empty());
    }
}
