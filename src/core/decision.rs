use crate::core::evaluator::LayeredMatchEvaluator;
use crate::core::validator::{ConfigurationError, RuleSetValidator, ValidatedRuleSet};
use crate::models::{MatchDecision, MatchIntent, MatchMode, Record, RuleSet};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that stop an evaluation before any scoring
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Errors a match sink can report
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Sink returned status {0}")]
    Status(u16),

    #[error("Sink closed")]
    Closed,
}

/// Receives intent-to-persist signals from commit-mode decisions
///
/// The decision service performs no writes; whoever implements this does.
#[async_trait]
pub trait MatchSink: Send + Sync {
    async fn emit(&self, intent: MatchIntent) -> Result<(), SinkError>;
}

/// Summary of a batch preview run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPreview {
    pub total_pairs: usize,
    pub evaluated: usize,
    pub blocked: usize,
    pub would_create: usize,
    pub cancelled: bool,
    pub decisions: Vec<MatchDecision>,
}

/// Public entry point for match decisions
///
/// Preview and commit share a single evaluation path; commit additionally
/// hands a `MatchIntent` to the sink.
#[derive(Clone)]
pub struct MatchDecisionService {
    evaluator: LayeredMatchEvaluator,
    validator: RuleSetValidator,
    sink: Arc<dyn MatchSink>,
}

impl MatchDecisionService {
    pub fn new(evaluator: LayeredMatchEvaluator, validator: RuleSetValidator, sink: Arc<dyn MatchSink>) -> Self {
        Self {
            evaluator,
            validator,
            sink,
        }
    }

    pub fn validator(&self) -> &RuleSetValidator {
        &self.validator
    }

    /// Evaluate a pair with the permissive acceptance rule (`total_score > 0`)
    pub async fn evaluate(
        &self,
        pro: &Record,
        client: &Record,
        rule_set: &ValidatedRuleSet,
        mode: MatchMode,
    ) -> MatchDecision {
        self.evaluate_with_threshold(pro, client, rule_set, mode, 0).await
    }

    /// Evaluate a pair, requiring `total_score >= min_score` on top of `> 0`
    pub async fn evaluate_with_threshold(
        &self,
        pro: &Record,
        client: &Record,
        rule_set: &ValidatedRuleSet,
        mode: MatchMode,
        min_score: u8,
    ) -> MatchDecision {
        let mut decision = self.decide(pro, client, rule_set, mode, min_score).await;

        if mode == MatchMode::Commit && decision.would_create {
            let intent = MatchIntent {
                intent_id: uuid::Uuid::new_v4(),
                pro_id: decision.pro_id.clone(),
                client_id: decision.client_id.clone(),
                rule_set_id: decision.rule_set_id.clone(),
                total_score: decision.breakdown.total_score,
                created_at: chrono::Utc::now(),
            };
            let intent_id = intent.intent_id;

            match self.sink.emit(intent).await {
                Ok(()) => {
                    tracing::debug!("Emitted match intent {} for {} / {}", intent_id, pro.id, client.id);
                    decision.intent_emitted = true;
                }
                Err(e) => {
                    tracing::warn!("Failed to emit match intent for {} / {}: {}", pro.id, client.id, e);
                }
            }
        }

        decision
    }

    /// Validate then evaluate; configuration errors surface before any scoring
    pub async fn evaluate_unvalidated(
        &self,
        pro: &Record,
        client: &Record,
        rule_set: RuleSet,
        mode: MatchMode,
    ) -> Result<MatchDecision, MatchError> {
        let validated = self.validator.validate(rule_set)?;
        Ok(self.evaluate(pro, client, &validated, mode).await)
    }

    /// Preview every pro x client pair with at most `concurrency` in flight
    ///
    /// Cancelling stops new pairs from starting; pairs already in flight finish.
    pub async fn preview_batch(
        &self,
        pros: &[Record],
        clients: &[Record],
        rule_set: &ValidatedRuleSet,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> BatchPreview {
        let total_pairs = pros.len() * clients.len();
        let pairs = pros
            .iter()
            .flat_map(|pro| clients.iter().map(move |client| (pro, client)));

        let mut decisions: Vec<MatchDecision> = stream::iter(pairs)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|(pro, client)| self.decide(pro, client, rule_set, MatchMode::Preview, 0))
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        decisions.sort_by(|a, b| {
            b.breakdown
                .total_score
                .cmp(&a.breakdown.total_score)
                .then_with(|| a.pro_id.cmp(&b.pro_id))
                .then_with(|| a.client_id.cmp(&b.client_id))
        });

        let evaluated = decisions.len();
        let blocked = decisions.iter().filter(|d| !d.breakdown.layer1_passed).count();
        let would_create = decisions.iter().filter(|d| d.would_create).count();
        // the token can fire after the last pair has already started
        let cancelled = cancel.is_cancelled() || evaluated < total_pairs;

        tracing::info!(
            "Batch preview against '{}': {}/{} pairs, {} blocked, {} would create{}",
            rule_set.id,
            evaluated,
            total_pairs,
            blocked,
            would_create,
            if cancelled { " (cancelled)" } else { "" }
        );

        BatchPreview {
            total_pairs,
            evaluated,
            blocked,
            would_create,
            cancelled,
            decisions,
        }
    }

    /// The single evaluation path behind both modes
    async fn decide(
        &self,
        pro: &Record,
        client: &Record,
        rule_set: &ValidatedRuleSet,
        mode: MatchMode,
        min_score: u8,
    ) -> MatchDecision {
        let breakdown = self.evaluator.evaluate(pro, client, rule_set).await;
        let would_create =
            breakdown.layer1_passed && breakdown.total_score > 0 && breakdown.total_score >= min_score;

        tracing::info!(
            "Match {} / {} [{:?}]: score {}, layer1 {}, would_create {}",
            pro.id,
            client.id,
            mode,
            breakdown.total_score,
            breakdown.layer1_passed,
            would_create
        );

        MatchDecision {
            pro_id: pro.id.clone(),
            client_id: client.id.clone(),
            rule_set_id: rule_set.id.clone(),
            mode,
            would_create,
            breakdown,
            intent_emitted: false,
            evaluated_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::comparator::FieldComparator;
    use crate::core::semantic::{OracleError, SemanticTextScorer, Similarity, SimilarityOracle};
    use crate::models::{FieldDefinition, FieldType, MatchingRule};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        intents: Mutex<Vec<MatchIntent>>,
    }

    #[async_trait]
    impl MatchSink for RecordingSink {
        async fn emit(&self, intent: MatchIntent) -> Result<(), SinkError> {
            self.intents.lock().await.push(intent);
            Ok(())
        }
    }

    struct ClosedSink;

    #[async_trait]
    impl MatchSink for ClosedSink {
        async fn emit(&self, _intent: MatchIntent) -> Result<(), SinkError> {
            Err(SinkError::Closed)
        }
    }

    fn rules() -> ValidatedRuleSet {
        let rule_set = RuleSet::new("default")
            .with_field(FieldDefinition::new("experience", FieldType::Number))
            .with_rule(MatchingRule::gate("geo", "City + State", "city+state"))
            .with_rule(MatchingRule::scored("exp", "Experience", "experience", 2, 100.0));
        RuleSetValidator::default().validate(rule_set).unwrap()
    }

    fn record(id: &str, city: &str, experience: f64) -> Record {
        Record::new(id)
            .with("city", city)
            .with("state", "TX")
            .with("experience", experience)
    }

    fn service(sink: Arc<dyn MatchSink>) -> MatchDecisionService {
        MatchDecisionService::new(LayeredMatchEvaluator::default(), RuleSetValidator::default(), sink)
    }

    #[tokio::test]
    async fn test_preview_has_no_side_effects() {
        let sink = Arc::new(RecordingSink::default());
        let service = service(sink.clone());

        let decision = service
            .evaluate(&record("p", "Austin", 10.0), &record("c", "Austin", 10.0), &rules(), MatchMode::Preview)
            .await;

        assert!(decision.would_create);
        assert!(!decision.intent_emitted);
        assert!(sink.intents.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_commit_emits_intent() {
        let sink = Arc::new(RecordingSink::default());
        let service = service(sink.clone());

        let decision = service
            .evaluate(&record("p", "Austin", 10.0), &record("c", "Austin", 10.0), &rules(), MatchMode::Commit)
            .await;

        assert!(decision.intent_emitted);
        let intents = sink.intents.lock().await;
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].pro_id, "p");
        assert_eq!(intents[0].total_score, 100);
    }

    #[tokio::test]
    async fn test_commit_blocked_emits_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let service = service(sink.clone());

        let decision = service
            .evaluate(&record("p", "Dallas", 10.0), &record("c", "Houston", 10.0), &rules(), MatchMode::Commit)
            .await;

        assert!(!decision.would_create);
        assert!(sink.intents.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_decision() {
        let service = service(Arc::new(ClosedSink));
        let pro = record("p", "Austin", 10.0);
        let client = record("c", "Austin", 10.0);

        let commit = service.evaluate(&pro, &client, &rules(), MatchMode::Commit).await;
        let preview = service.evaluate(&pro, &client, &rules(), MatchMode::Preview).await;

        assert!(commit.would_create);
        assert!(!commit.intent_emitted);
        assert_eq!(commit.breakdown, preview.breakdown);
    }

    #[tokio::test]
    async fn test_threshold() {
        let service = service(Arc::new(RecordingSink::default()));
        // 10 vs 4: 85.7% apart -> 10 points
        let pro = record("p", "Austin", 10.0);
        let client = record("c", "Austin", 4.0);

        let permissive = service.evaluate(&pro, &client, &rules(), MatchMode::Preview).await;
        let strict = service
            .evaluate_with_threshold(&pro, &client, &rules(), MatchMode::Preview, 30)
            .await;

        assert_eq!(permissive.breakdown.total_score, 10);
        assert!(permissive.would_create);
        assert!(!strict.would_create);
    }

    #[tokio::test]
    async fn test_zero_score_does_not_create() {
        let service = service(Arc::new(RecordingSink::default()));
        let decision = service
            .evaluate(&record("p", "Austin", 10.0), &record("c", "Austin", 100.0), &rules(), MatchMode::Preview)
            .await;

        assert!(decision.breakdown.layer1_passed);
        assert_eq!(decision.breakdown.total_score, 0);
        assert!(!decision.would_create);
    }

    #[tokio::test]
    async fn test_unvalidated_rule_set_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let service = service(sink.clone());
        let rule_set = RuleSet::new("bad")
            .with_field(FieldDefinition::new("experience", FieldType::Number))
            .with_rule(MatchingRule::scored("exp", "Experience", "experience", 2, 90.0));

        let err = service
            .evaluate_unvalidated(&record("p", "Austin", 1.0), &record("c", "Austin", 1.0), rule_set, MatchMode::Commit)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("90.0%"));
        assert!(sink.intents.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_preview() {
        let service = service(Arc::new(RecordingSink::default()));
        let pros = vec![record("p1", "Austin", 10.0), record("p2", "Dallas", 10.0)];
        let clients = vec![record("c1", "Austin", 10.0), record("c2", "Austin", 9.0), record("c3", "Dallas", 5.0)];

        let batch = service
            .preview_batch(&pros, &clients, &rules(), 2, &CancellationToken::new())
            .await;

        assert_eq!(batch.total_pairs, 6);
        assert_eq!(batch.evaluated, 6);
        assert!(!batch.cancelled);
        assert_eq!(batch.blocked, 3);
        assert_eq!(batch.would_create, 3);
        assert_eq!(batch.decisions[0].pro_id, "p1");
        assert_eq!(batch.decisions[0].client_id, "c1");
        assert!(batch.decisions.iter().all(|d| d.mode == MatchMode::Preview && !d.intent_emitted));
    }

    #[tokio::test]
    async fn test_batch_cancelled_before_start() {
        let service = service(Arc::new(RecordingSink::default()));
        let pros = vec![record("p1", "Austin", 10.0)];
        let clients = vec![record("c1", "Austin", 10.0)];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let batch = service.preview_batch(&pros, &clients, &rules(), 4, &cancel).await;

        assert!(batch.cancelled);
        assert_eq!(batch.evaluated, 0);
        assert!(batch.decisions.is_empty());
    }

    /// Oracle that holds each call open and tracks how many overlap
    struct SlowOracle {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        started: AtomicUsize,
        cancel_on_call: Option<(usize, CancellationToken)>,
    }

    impl SlowOracle {
        fn new(cancel_on_call: Option<(usize, CancellationToken)>) -> Self {
            Self {
                delay: Duration::from_millis(200),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                started: AtomicUsize::new(0),
                cancel_on_call,
            }
        }
    }

    #[async_trait]
    impl SimilarityOracle for SlowOracle {
        async fn similarity(&self, _a: &str, _b: &str, _context: &str) -> Result<Similarity, OracleError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let call = self.started.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((at, token)) = &self.cancel_on_call {
                if call == *at {
                    token.cancel();
                }
            }

            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Similarity {
                similarity: 0.5,
                reasoning: "held".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn text_rules() -> ValidatedRuleSet {
        let rule_set = RuleSet::new("text")
            .with_field(FieldDefinition::new("specialty", FieldType::Text).semantic())
            .with_rule(MatchingRule::scored("specialty", "Specialty", "specialty", 2, 100.0));
        RuleSetValidator::default().validate(rule_set).unwrap()
    }

    fn text_records(prefix: &str, count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| Record::new(format!("{}{}", prefix, i)).with("specialty", format!("{} niche {}", prefix, i).as_str()))
            .collect()
    }

    fn oracle_service(oracle: Arc<SlowOracle>) -> MatchDecisionService {
        let semantic = SemanticTextScorer::new(oracle, Duration::from_secs(5), 70.0);
        MatchDecisionService::new(
            LayeredMatchEvaluator::new(FieldComparator::default(), semantic),
            RuleSetValidator::default(),
            Arc::new(RecordingSink::default()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_respects_concurrency_cap() {
        let oracle = Arc::new(SlowOracle::new(None));
        let service = oracle_service(oracle.clone());
        let pros = text_records("p", 4);
        let clients = text_records("c", 3);

        let batch = service
            .preview_batch(&pros, &clients, &text_rules(), 3, &CancellationToken::new())
            .await;

        assert_eq!(batch.evaluated, 12);
        assert_eq!(oracle.started.load(Ordering::SeqCst), 12);
        let peak = oracle.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight oracle calls {}", peak);
        assert!(peak > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_cancelled_mid_run_finishes_started_pairs() {
        let cancel = CancellationToken::new();
        let oracle = Arc::new(SlowOracle::new(Some((3, cancel.clone()))));
        let service = oracle_service(oracle.clone());
        let pros = text_records("p", 3);
        let clients = text_records("c", 2);

        let batch = service.preview_batch(&pros, &clients, &text_rules(), 2, &cancel).await;

        assert!(batch.cancelled);
        assert!(batch.evaluated >= 3);
        assert!(batch.evaluated < batch.total_pairs);
        // every pair that reached the oracle completed and was reported
        assert_eq!(oracle.started.load(Ordering::SeqCst), batch.evaluated);
        assert_eq!(oracle.in_flight.load(Ordering::SeqCst), 0);
        for decision in &batch.decisions {
            assert!(decision.breakdown.layer1_passed);
            assert_eq!(decision.breakdown.total_score, 50);
            assert_eq!(decision.breakdown.field_scores[0].details, "oracle: held");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_cancelled_during_last_pair() {
        let cancel = CancellationToken::new();
        let oracle = Arc::new(SlowOracle::new(Some((1, cancel.clone()))));
        let service = oracle_service(oracle);

        let batch = service
            .preview_batch(&text_records("p", 1), &text_records("c", 1), &text_rules(), 4, &cancel)
            .await;

        assert_eq!(batch.evaluated, batch.total_pairs);
        assert!(batch.cancelled);
    }
}
