pub mod config;
pub mod directive;
pub mod domain;
pub mod errors;
pub mod history;
pub mod messages;
pub mod usage;

pub use directive::{Directive, DirectiveMarkers};
pub use domain::claim::{ClaimRecord, ClaimReference, NewClaim, CLAIM_STATUS_RECORDED};
pub use domain::contract::{
    AdherentSummary, ContractDetails, ContractNumber, FormuleDetails, GarantieLine,
};
pub use domain::conversation::ConversationId;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use history::{ConversationHistory, ToolCall, ToolResult, Turn, DEFAULT_MAX_HISTORY_PAIRS};
pub use usage::UsageStats;
