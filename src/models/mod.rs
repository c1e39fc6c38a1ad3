// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    field_components, FieldDefinition, FieldScore, FieldType, FieldValue, MatchBreakdown, MatchDecision,
    MatchIntent, MatchMode, MatchType, MatchingRule, Record, RuleSet, COMPOSITE_SEPARATOR,
};
pub(crate) use domain::format_number;
pub use requests::{BatchPreviewRequest, EvaluateRequest};
pub use responses::{ErrorResponse, HealthResponse, ValidateRulesResponse};
