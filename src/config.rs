// ABOUTME: Configuration for sandbox execution limits and the agent loop

use std::time::Duration;

/// Hard ceiling on the evaluator iteration budget; `loop_limit` is clamped
/// to this no matter what the caller asks for.
pub const LOOP_LIMIT_MAX: u64 = 10_000;

/// What to do when a turn's memory delta pushes memory past its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryStrategy {
    /// Breach is fatal for the mission.
    #[default]
    Strict,
    /// Discard this turn's delta, feed a short error to the LLM, continue.
    Rollback,
}

/// Limits applied to one sandboxed program execution.
#[derive(Debug, Clone)]
pub struct SandboxOptions {
    /// Wall-clock budget for the whole program.
    pub timeout: Duration,
    /// Heap ceiling in machine-independent cost units (~bytes).
    pub heap_limit: usize,
    /// Call-evaluation budget guarding against recursion bombs.
    pub loop_limit: u64,
    /// Per-item budget inside `pmap`.
    pub pmap_timeout: Duration,
    /// Character cap for a single `print`/`println` call.
    pub print_limit: usize,
    /// Round floats in the returned value to this many decimal places.
    pub float_precision: Option<u32>,
    /// Cost-unit cap on the carried memory map after the merge.
    pub memory_limit: Option<usize>,
    pub memory_strategy: MemoryStrategy,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            heap_limit: 10 * 1024 * 1024,
            loop_limit: 1000,
            pmap_timeout: Duration::from_millis(1000),
            print_limit: 1000,
            float_precision: None,
            memory_limit: None,
            memory_strategy: MemoryStrategy::default(),
        }
    }
}

impl SandboxOptions {
    pub fn effective_loop_limit(&self) -> u64 {
        self.loop_limit.min(LOOP_LIMIT_MAX)
    }
}

/// Retry policy for transient LLM errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Configuration for a SubAgent mission.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_turns: u32,
    /// Consecutive recoverable-error turns tolerated before giving up; also
    /// sets when the must-return phase begins.
    pub retry_turns: u32,
    pub mission_timeout: Duration,
    /// Cumulative token budget across turns, if the callback reports usage.
    pub turn_budget: Option<u64>,
    pub llm_retry: RetryPolicy,
    pub sandbox: SandboxOptions,
    /// Character budget for inventory samples and turn-history entries.
    pub sample_budget: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            retry_turns: 3,
            mission_timeout: Duration::from_secs(120),
            turn_budget: None,
            llm_retry: RetryPolicy::default(),
            sandbox: SandboxOptions::default(),
            sample_budget: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_limits() {
        let opts = SandboxOptions::default();
        assert_eq!(opts.timeout, Duration::from_millis(1000));
        assert_eq!(opts.heap_limit, 10 * 1024 * 1024);
        assert_eq!(opts.loop_limit, 1000);
    }

    #[test]
    fn test_loop_limit_is_clamped() {
        let opts = SandboxOptions {
            loop_limit: 1_000_000,
            ..Default::default()
        };
        assert_eq!(opts.effective_loop_limit(), LOOP_LIMIT_MAX);
    }
}
