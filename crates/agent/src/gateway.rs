//! Provider-neutral contract between the turn loop and the language model.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use guichet_core::{ToolCall, Turn, UsageStats};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

/// JSON-schema-shaped declaration of one callable tool, published to the
/// gateway so the model knows what it may request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// What one gateway call produced: either text or exactly one tool call,
/// plus the usage fragment for that call.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub content: CompletionContent,
    pub usage: UsageStats,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CompletionContent {
    Text(String),
    ToolCall(ToolCall),
}

impl Completion {
    pub fn text(text: impl Into<String>, usage: UsageStats) -> Self {
        Self { content: CompletionContent::Text(text.into()), usage }
    }

    pub fn tool_call(call: ToolCall, usage: UsageStats) -> Self {
        Self { content: CompletionContent::ToolCall(call), usage }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway request timed out")]
    Timeout,
    #[error("could not reach the gateway: {0}")]
    Connect(String),
    #[error("gateway rate limit hit (HTTP 429)")]
    RateLimited,
    #[error("gateway server error (HTTP {status})")]
    Server { status: u16 },
    #[error("gateway rejected the request (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("could not decode the gateway response: {0}")]
    Decode(String),
    #[error("gateway configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Transport-level trouble is worth another attempt; rejections,
    /// decode failures, and configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connect(_) | Self::RateLimited | Self::Server { .. }
        )
    }
}

/// One completion request against the model provider.
///
/// `history` is the full turn sequence for the conversation, oldest first.
/// Implementations must map tool request/result turns onto the provider's
/// function-calling wire format.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn generate(
        &self,
        history: &[Turn],
        system_instruction: &str,
        tools: &[ToolSchema],
    ) -> Result<Completion, GatewayError>;
}

/// Bounded exponential backoff for retryable gateway failures.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay_ms: 1_000, max_delay_ms: 16_000 }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based): doubles each
    /// attempt, capped at `max_delay_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        Duration::from_millis(self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms))
    }
}

/// Call the gateway under `policy`, sleeping between retryable failures.
///
/// Fatal errors and exhausted retries surface to the caller; the turn loop
/// turns them into the fixed unavailability apology.
pub async fn generate_with_retry(
    gateway: &dyn LlmGateway,
    policy: RetryPolicy,
    history: &[Turn],
    system_instruction: &str,
    tools: &[ToolSchema],
) -> Result<Completion, GatewayError> {
    let mut attempt = 0;
    loop {
        match gateway.generate(history, system_instruction, tools).await {
            Ok(completion) => return Ok(completion),
            Err(error) if error.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.backoff(attempt - 1);
                warn!(
                    event_name = "gateway.call.retry",
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "gateway call failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(error) => return Err(error),
        }
    }
}

/// Gateway that answers every call with a fixed line and zero usage.
///
/// Wired in when `gateway.provider = "noop"`; lets the engine run without
/// network access or credentials (smoke checks, offline development).
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLlmGateway;

impl NoopLlmGateway {
    pub const ANSWER: &'static str =
        "Je suis une maquette de l'assistant; aucun modèle n'est connecté.";
}

#[async_trait]
impl LlmGateway for NoopLlmGateway {
    async fn generate(
        &self,
        _history: &[Turn],
        _system_instruction: &str,
        _tools: &[ToolSchema],
    ) -> Result<Completion, GatewayError> {
        Ok(Completion::text(Self::ANSWER, UsageStats::default()))
    }
}

#[derive(Default)]
struct ScriptedState {
    script: VecDeque<Result<Completion, GatewayError>>,
    calls: u32,
    observed_history_lens: Vec<usize>,
}

/// Gateway double that replays a prepared script of completions.
///
/// Once the script runs dry, every further call answers with a fixed text
/// so tests fail on call counts rather than hangs. Call observations are
/// recorded for asserting how the turn loop drove the gateway.
pub struct ScriptedGateway {
    state: Mutex<ScriptedState>,
}

impl ScriptedGateway {
    pub fn with_script(script: Vec<Result<Completion, GatewayError>>) -> Self {
        Self { state: Mutex::new(ScriptedState { script: script.into(), ..Default::default() }) }
    }

    /// Script that answers each call with the next fixed text.
    pub fn answering<T: Into<String>>(answers: Vec<T>) -> Self {
        Self::with_script(
            answers
                .into_iter()
                .map(|text| Ok(Completion::text(text, UsageStats::default())))
                .collect(),
        )
    }

    pub async fn calls(&self) -> u32 {
        self.state.lock().await.calls
    }

    /// History length seen by each call, in call order.
    pub async fn observed_history_lens(&self) -> Vec<usize> {
        self.state.lock().await.observed_history_lens.clone()
    }
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    async fn generate(
        &self,
        history: &[Turn],
        _system_instruction: &str,
        _tools: &[ToolSchema],
    ) -> Result<Completion, GatewayError> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        state.observed_history_lens.push(history.len());
        state
            .script
            .pop_front()
            .unwrap_or_else(|| Ok(Completion::text("Script épuisé.", UsageStats::default())))
    }
}
