//! Dialogue Engine - conversation orchestration for the Guichet assistant
//!
//! This crate sits between a transport (HTTP, console, or a real-time
//! bridge) and the language model. It owns:
//! - Conversation state and the bounded turn history
//! - The turn loop: gateway call, at most one tool round trip, directive parse
//! - Tool dispatch against the insurance portfolio backend
//! - Session lifecycle (welcome, idle timeout, farewell, disconnect)
//!
//! # Architecture
//!
//! One user message flows through a fixed pipeline:
//! 1. **Session Registry** (`registry`) - Resolve `(session_id, conversation_id)`
//!    to a per-conversation slot; the slot mutex serializes the whole turn
//! 2. **Turn Processor** (`session`) - Drive the gateway, dispatch at most one
//!    tool call, substitute the no-answer sentinel, trim history
//! 3. **Tool Dispatcher** (`tools`) - Validate model-supplied arguments and run
//!    the backend repositories; every failure is an error payload, never a panic
//! 4. **Directive handling** (`guichet-core::directive`, `clarify`) - Route
//!    answer / clarification / hand-off decisions parsed from the model text
//!
//! # Key Types
//!
//! - `DialogueRuntime` - Composed engine handed to servers and CLI commands
//! - `LlmGateway` - Pluggable completion contract (`gemini`, noop, scripted)
//! - `IdleMonitor` - Per-session watchdog that closes out silent sessions
//!
//! # Safety Principle
//!
//! The user always gets an answer. Gateway exhaustion, tool failures, and
//! protocol anomalies (a second tool call, an empty completion) all degrade
//! to fixed French messages; raw internal errors never reach the conversation.

pub mod clarify;
pub mod gateway;
pub mod gemini;
pub mod monitor;
pub mod prompt;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod tools;
pub mod transport;

pub use clarify::{render_outcome, ConversationStatus};
pub use gateway::{
    Completion, CompletionContent, GatewayError, LlmGateway, NoopLlmGateway, RetryPolicy,
    ScriptedGateway, ToolSchema,
};
pub use gemini::GeminiGateway;
pub use monitor::{ActivityTracker, IdleMonitor, MonitorOutcome, MonitorSettings};
pub use registry::{SessionRegistry, SessionSlot};
pub use runtime::{DialogueRuntime, MessageOutcome};
pub use session::{DialogueSession, TurnOutcome, TurnProcessor};
pub use tools::ToolDispatcher;
pub use transport::{NoopTransport, ScriptedTransport, TransportAdapter, TransportError};
