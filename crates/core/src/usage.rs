use serde::{Deserialize, Serialize};

/// Token accounting for one answered user message.
///
/// A turn can hit the gateway twice (tool call, then resume); fragments
/// from both calls are accumulated here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageStats {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self { prompt_tokens, completion_tokens, total_tokens }
    }

    pub fn add(&mut self, fragment: UsageStats) {
        self.prompt_tokens += fragment.prompt_tokens;
        self.completion_tokens += fragment.completion_tokens;
        self.total_tokens += fragment.total_tokens;
    }
}
