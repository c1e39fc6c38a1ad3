use crate::models::domain::{MatchMode, Record};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to evaluate a single pro/client pair
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EvaluateRequest {
    pub pro: Record,
    pub client: Record,
    /// Rule set to use; the configured default when absent
    #[serde(default, alias = "ruleSetId")]
    #[validate(length(min = 1))]
    pub rule_set_id: Option<String>,
    #[serde(default)]
    pub mode: MatchMode,
    /// Caller's acceptance bar on top of `total_score > 0`
    #[serde(default, alias = "minScore")]
    #[validate(range(max = 100))]
    pub min_score: Option<u8>,
}

/// Request to preview every pro against every client
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchPreviewRequest {
    #[validate(length(min = 1))]
    pub pros: Vec<Record>,
    #[validate(length(min = 1))]
    pub clients: Vec<Record>,
    #[serde(default, alias = "ruleSetId")]
    #[validate(length(min = 1))]
    pub rule_set_id: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1, max = 256))]
    pub concurrency: Option<usize>,
}
