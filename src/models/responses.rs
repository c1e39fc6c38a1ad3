use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub oracle_enabled: bool,
    pub rule_sets: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

/// Rule set validation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRulesResponse {
    pub rule_set_id: String,
    pub valid: bool,
    pub errors: Vec<String>,
}
