//! Free-text comparison with an optional similarity oracle.
//!
//! The oracle is an injected strategy: production wires an HTTP model
//! behind it, tests and the runtime fallback use [`SubstringOracle`].
//! Whatever happens to the oracle, scoring always yields a `FieldScore`.

use crate::core::comparator::normalize;
use crate::models::{FieldScore, MatchType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors a similarity oracle can report
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Oracle returned status {0}")]
    Status(u16),

    #[error("Invalid oracle response: {0}")]
    InvalidResponse(String),

    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Oracle disabled")]
    Disabled,
}

/// Oracle verdict for a pair of texts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Similarity {
    /// In [0, 1]
    pub similarity: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// External judge of free-text similarity
#[async_trait]
pub trait SimilarityOracle: Send + Sync {
    async fn similarity(&self, a: &str, b: &str, context: &str) -> Result<Similarity, OracleError>;

    /// Short label for logs
    fn name(&self) -> &'static str;
}

/// Deterministic substring heuristic, capped at `cap`
///
/// Returns the 0-100 score: the length ratio of the shorter string to the
/// longer one when the longer contains the shorter, else 0.
pub fn substring_score(a: &str, b: &str, cap: f64) -> f64 {
    let (long, short) = if a.chars().count() >= b.chars().count() { (a, b) } else { (b, a) };
    let long_len = long.chars().count();
    if long_len == 0 || short.is_empty() || !long.contains(short) {
        return 0.0;
    }
    let ratio = (100.0 * short.chars().count() as f64 / long_len as f64).round();
    ratio.min(cap)
}

/// The pure oracle: substring overlap expressed as a similarity
#[derive(Debug, Clone)]
pub struct SubstringOracle {
    cap: f64,
}

impl SubstringOracle {
    pub fn new(cap: f64) -> Self {
        Self { cap }
    }
}

impl Default for SubstringOracle {
    fn default() -> Self {
        Self::new(70.0)
    }
}

#[async_trait]
impl SimilarityOracle for SubstringOracle {
    async fn similarity(&self, a: &str, b: &str, _context: &str) -> Result<Similarity, OracleError> {
        let a = normalize(a);
        let b = normalize(b);
        let score = substring_score(&a, &b, self.cap);
        Ok(Similarity {
            similarity: score / 100.0,
            reasoning: if score > 0.0 { "substring containment".into() } else { "no substring containment".into() },
        })
    }

    fn name(&self) -> &'static str {
        "substring"
    }
}

/// Scores free-text pairs, preferring the oracle when enabled
#[derive(Clone)]
pub struct SemanticTextScorer {
    oracle: Option<Arc<dyn SimilarityOracle>>,
    timeout: Duration,
    substring_cap: f64,
}

impl std::fmt::Debug for SemanticTextScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticTextScorer")
            .field("oracle", &self.oracle.as_ref().map(|o| o.name()))
            .field("timeout", &self.timeout)
            .field("substring_cap", &self.substring_cap)
            .finish()
    }
}

impl Default for SemanticTextScorer {
    fn default() -> Self {
        Self::fallback_only(70.0)
    }
}

impl SemanticTextScorer {
    pub fn new(oracle: Arc<dyn SimilarityOracle>, timeout: Duration, substring_cap: f64) -> Self {
        Self {
            oracle: Some(oracle),
            timeout,
            substring_cap,
        }
    }

    /// A scorer with no oracle; every non-exact pair uses the substring heuristic
    pub fn fallback_only(substring_cap: f64) -> Self {
        Self {
            oracle: None,
            timeout: Duration::from_secs(0),
            substring_cap,
        }
    }

    pub fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }

    /// Score a free-text pair
    ///
    /// Never fails: oracle errors and timeouts degrade to the substring heuristic.
    pub async fn score(
        &self,
        field_name: &str,
        text_a: &str,
        text_b: &str,
        context: &str,
        semantic_enabled: bool,
    ) -> FieldScore {
        let a = normalize(text_a);
        let b = normalize(text_b);

        if a == b {
            return FieldScore::new(field_name, 100.0, MatchType::Exact, "identical text");
        }

        let outcome = match (&self.oracle, semantic_enabled) {
            (Some(oracle), true) => self.call_oracle(oracle.as_ref(), &a, &b, context).await,
            _ => Err(OracleError::Disabled),
        };

        match outcome {
            Ok(verdict) => {
                let score = (verdict.similarity * 100.0).round();
                FieldScore::new(field_name, score, MatchType::Semantic, format!("oracle: {}", verdict.reasoning))
            }
            Err(e) => {
                if !matches!(e, OracleError::Disabled) {
                    tracing::warn!("Similarity oracle failed for field '{}', using substring fallback: {}", field_name, e);
                }
                let score = substring_score(&a, &b, self.substring_cap);
                let details = if score > 0.0 {
                    format!("fallback substring: containment ({})", e)
                } else {
                    format!("fallback substring: no containment ({})", e)
                };
                FieldScore::new(field_name, score, MatchType::Semantic, details)
            }
        }
    }

    async fn call_oracle(
        &self,
        oracle: &dyn SimilarityOracle,
        a: &str,
        b: &str,
        context: &str,
    ) -> Result<Similarity, OracleError> {
        let verdict = tokio::time::timeout(self.timeout, oracle.similarity(a, b, context))
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))??;

        if !verdict.similarity.is_finite() || !(0.0..=1.0).contains(&verdict.similarity) {
            return Err(OracleError::InvalidResponse(format!(
                "similarity {} outside [0, 1]",
                verdict.similarity
            )));
        }

        tracing::debug!("Oracle '{}' similarity {:.3} for context '{}'", oracle.name(), verdict.similarity, context);
        Ok(verdict)
    }
}
