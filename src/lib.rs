//! Agent Match - layered match scoring engine for pro/client recruiting matches
//!
//! Given a pro, a client and a validated rule set, the engine decides
//! whether a match is allowed (layer 1 gate) and how strong it is
//! (weighted layer 2+ scoring), returning a full per-field breakdown.
//! Preview and commit decisions share one evaluation path.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{
    FieldComparator, LayeredMatchEvaluator, MatchDecisionService, MatchError, MatchSink, RuleSetValidator,
    ScoringConstants, SemanticTextScorer, SimilarityOracle, SubstringOracle, ValidatedRuleSet,
};
pub use models::{
    FieldDefinition, FieldScore, FieldType, FieldValue, MatchBreakdown, MatchDecision, MatchMode, MatchType,
    MatchingRule, Record, RuleSet,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let validated = RuleSetValidator::default().validate(RuleSet::new("empty")).unwrap();
        assert!(validated.rules.is_empty());
        assert_eq!(ScoringConstants::default().substring_cap, 70.0);
    }
}
