use crate::core::comparator::{to_set, Comparison, FieldComparator, ScoringConstants};
use crate::core::semantic::SemanticTextScorer;
use crate::models::{
    field_components, FieldScore, FieldType, MatchBreakdown, MatchType, MatchingRule, Record, RuleSet,
};
use std::collections::BTreeSet;

/// Joins composite key components, e.g. `austin|tx`
const KEY_JOIN: &str = "|";

/// Outcome of one layer-1 rule
#[derive(Debug, Clone)]
struct GateOutcome {
    passed: bool,
    score: FieldScore,
    rule_name: String,
}

/// Two-layer match evaluator
///
/// # Pipeline
/// 1. Layer 1 gate: at least one mandatory rule must share a normalized value
/// 2. Layer 2+: weighted field scores accumulated onto a 0-100 scale
///
/// Layer 2 never runs for a pair that failed the gate.
#[derive(Debug, Clone, Default)]
pub struct LayeredMatchEvaluator {
    comparator: FieldComparator,
    semantic: SemanticTextScorer,
}

impl LayeredMatchEvaluator {
    pub fn new(comparator: FieldComparator, semantic: SemanticTextScorer) -> Self {
        Self { comparator, semantic }
    }

    /// Evaluator with the given constants and no similarity oracle
    pub fn with_constants(constants: ScoringConstants) -> Self {
        let cap = constants.substring_cap;
        Self {
            comparator: FieldComparator::new(constants),
            semantic: SemanticTextScorer::fallback_only(cap),
        }
    }

    pub fn constants(&self) -> &ScoringConstants {
        self.comparator.constants()
    }

    /// Evaluate one pro/client pair against a rule set
    ///
    /// Always returns a complete breakdown: either blocked at layer 1 with a
    /// reason, or fully scored.
    pub async fn evaluate(&self, pro: &Record, client: &Record, rule_set: &RuleSet) -> MatchBreakdown {
        let gate: Vec<GateOutcome> = rule_set
            .gate_rules()
            .map(|rule| evaluate_gate_rule(rule, pro, client))
            .collect();

        let mut field_scores: Vec<FieldScore> = gate.iter().map(|g| g.score.clone()).collect();

        if gate.is_empty() {
            tracing::debug!("Rule set '{}' has no layer 1 rules, gate passes", rule_set.id);
        } else if !gate.iter().any(|g| g.passed) {
            let checked: Vec<String> = gate
                .iter()
                .map(|g| format!("{} ({})", g.rule_name, g.score.details))
                .collect();
            let reason = format!("no {}: checked {}", rule_set.gate_label, checked.join(", "));
            tracing::debug!("Pair {} / {} blocked at layer 1: {}", pro.id, client.id, reason);
            return MatchBreakdown::blocked(field_scores, reason);
        }

        let layers: Vec<(u8, Vec<&MatchingRule>)> = rule_set
            .scoring_layers()
            .into_iter()
            .map(|layer| {
                let rules = rule_set
                    .rules
                    .iter()
                    .filter(|r| r.layer == layer && r.enabled)
                    .collect::<Vec<_>>();
                (layer, rules)
            })
            .filter(|(_, rules)| !rules.is_empty())
            .collect();

        let layer_count = layers.len().max(1) as f64;
        let constants = self.comparator.constants();
        let mut fallback_normalization = false;
        let mut total = 0.0;

        for (layer, rules) in layers {
            let weight_total: f64 = rules.iter().map(|r| r.weight).sum();
            let normalizer = if (weight_total - constants.layer_weight_total).abs() <= constants.weight_tolerance {
                constants.layer_weight_total
            } else {
                tracing::warn!(
                    "Rule set '{}' layer {} enabled weights total {:.1}, re-normalizing",
                    rule_set.id,
                    layer,
                    weight_total
                );
                fallback_normalization = true;
                weight_total
            };

            for rule in rules {
                let mut score = self.score_rule(rule, pro, client, rule_set).await;
                score.weighted_score = if normalizer > 0.0 {
                    score.score * rule.weight / normalizer / layer_count
                } else {
                    0.0
                };
                tracing::debug!(
                    "Field '{}' scored {:.2} ({:?}), weighted {:.2}",
                    score.field_name,
                    score.score,
                    score.match_type,
                    score.weighted_score
                );
                total += score.weighted_score;
                field_scores.push(score);
            }
        }

        MatchBreakdown {
            total_score: total.round().clamp(0.0, 100.0) as u8,
            field_scores,
            layer1_passed: true,
            blocked_reason: None,
            fallback_normalization,
        }
    }

    /// Raw 0-100 score for one weighted rule
    async fn score_rule(&self, rule: &MatchingRule, pro: &Record, client: &Record, rule_set: &RuleSet) -> FieldScore {
        let definition = rule_set.field(&rule.field);
        let field_type = definition.map(|d| d.field_type).unwrap_or(FieldType::Unknown);
        let semantic_enabled = definition.map(|d| d.semantic_enabled).unwrap_or(false);

        if definition.is_none() {
            tracing::warn!("Rule '{}' references undefined field '{}'", rule.id, rule.field);
        }

        let comparison = self.comparator.compare(
            &rule.field,
            field_type,
            pro.get(&rule.field),
            client.get(rule.client_field_name()),
        );

        match comparison {
            Comparison::Scored(score) => score,
            Comparison::Text { a, b } => {
                self.semantic
                    .score(&rule.field, &a, &b, &rule.name, semantic_enabled)
                    .await
            }
        }
    }
}

/// Normalized keys a record offers for a possibly-composite field
///
/// Components expand as sets (a zip-code list yields one key per zip) and
/// combine as a cartesian product. Any missing component yields no keys.
fn gate_keys(record: &Record, components: &[&str]) -> BTreeSet<String> {
    let mut keys: BTreeSet<String> = [String::new()].into_iter().collect();

    for (i, component) in components.iter().enumerate() {
        let values = match record.get(component).and_then(to_set) {
            Some(values) if !values.is_empty() => values,
            _ => return BTreeSet::new(),
        };
        keys = keys
            .iter()
            .flat_map(|prefix| {
                values.iter().map(move |v| {
                    if i == 0 {
                        v.clone()
                    } else {
                        format!("{}{}{}", prefix, KEY_JOIN, v)
                    }
                })
            })
            .collect();
    }

    keys
}

/// Exact-semantics layer-1 check: pass iff the two sides share a key
fn evaluate_gate_rule(rule: &MatchingRule, pro: &Record, client: &Record) -> GateOutcome {
    let pro_components = field_components(&rule.field);
    let client_components = field_components(rule.client_field_name());

    let fail = |details: String| GateOutcome {
        passed: false,
        score: FieldScore::none(rule.field.clone(), details),
        rule_name: rule.name.clone(),
    };

    if pro_components.is_empty() || pro_components.len() != client_components.len() {
        return fail("mismatched field components".to_string());
    }

    let pro_keys = gate_keys(pro, &pro_components);
    let client_keys = gate_keys(client, &client_components);

    if pro_keys.is_empty() || client_keys.is_empty() {
        return fail("missing value(s)".to_string());
    }

    match pro_keys.intersection(&client_keys).next() {
        Some(shared) => GateOutcome {
            passed: true,
            score: FieldScore::new(rule.field.clone(), 100.0, MatchType::Exact, format!("shared '{}'", shared)),
            rule_name: rule.name.clone(),
        },
        None => fail("no shared value".to_string()),
    }
}
