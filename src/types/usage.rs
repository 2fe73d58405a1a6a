//! Token usage reported at the end of a run.

use serde::{Deserialize, Serialize};

/// Token usage for a run.
///
/// Servers disagree on naming, so both `camelCase` and `snake_case`
/// spellings (and the older `prompt`/`completion` names) are accepted.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(
        default,
        alias = "input_tokens",
        alias = "promptTokens",
        alias = "prompt_tokens"
    )]
    pub input_tokens: u32,
    #[serde(
        default,
        alias = "output_tokens",
        alias = "completionTokens",
        alias = "completion_tokens"
    )]
    pub output_tokens: u32,
    #[serde(default, alias = "total_tokens")]
    pub total_tokens: u32,
}

impl Usage {
    /// Merge another usage into this one (accumulate).
    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}
