// Match scoring engine
pub mod comparator;
pub mod decision;
pub mod evaluator;
pub mod semantic;
pub mod validator;

pub use comparator::{Comparison, FieldComparator, NumericBand, ScoringConstants};
pub use decision::{BatchPreview, MatchDecisionService, MatchError, MatchSink, SinkError};
pub use evaluator::LayeredMatchEvaluator;
pub use semantic::{OracleError, SemanticTextScorer, Similarity, SimilarityOracle, SubstringOracle};
pub use validator::{ConfigIssue, ConfigurationError, RuleSetValidator, ValidatedRuleSet};
