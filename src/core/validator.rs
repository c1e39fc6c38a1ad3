use crate::core::comparator::ScoringConstants;
use crate::models::{MatchingRule, RuleSet};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;

/// A single reason a rule set was rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigIssue {
    #[error("layer 1 rule '{0}' must be mandatory")]
    GateRuleNotMandatory(String),

    #[error("layer 1 rule '{0}' cannot be disabled")]
    GateRuleDisabled(String),

    #[error("layer {layer} enabled weights total {total:.1}%, expected {expected:.0}%")]
    LayerWeightTotal { layer: u8, total: f64, expected: f64 },

    #[error("rule id '{0}' is used more than once")]
    DuplicateRuleId(String),

    #[error("rule '{rule_id}' has invalid weight {weight}")]
    InvalidWeight { rule_id: String, weight: f64 },

    #[error("rule '{0}' has layer 0; layers start at 1")]
    InvalidLayer(String),

    #[error("rule '{rule_id}' references undefined field '{field}'")]
    UndefinedField { rule_id: String, field: String },

    #[error("rule '{0}' uses a composite field outside layer 1")]
    CompositeOutsideGate(String),

    #[error("field '{0}' is defined more than once")]
    DuplicateField(String),

    #[error("field '{name}' has invalid weight {weight}")]
    InvalidFieldWeight { name: String, weight: f64 },
}

/// A rule set failed validation; nothing was corrected
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ConfigurationError {
    pub rule_set_id: String,
    pub issues: Vec<ConfigIssue>,
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid rule set '{}': ", self.rule_set_id)?;
        let messages: Vec<String> = self.issues.iter().map(ToString::to_string).collect();
        f.write_str(&messages.join("; "))
    }
}

/// A rule set that passed validation
///
/// Only [`RuleSetValidator`] can build one, and it exposes no mutable access,
/// so holding one proves the configuration is consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRuleSet {
    inner: Arc<RuleSet>,
}

impl ValidatedRuleSet {
    pub fn rule_set(&self) -> &RuleSet {
        &self.inner
    }

    pub fn into_inner(self) -> Arc<RuleSet> {
        self.inner
    }
}

impl Deref for ValidatedRuleSet {
    type Target = RuleSet;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Checks weight configurations before they can become active
#[derive(Debug, Clone, Default)]
pub struct RuleSetValidator {
    constants: ScoringConstants,
}

impl RuleSetValidator {
    pub fn new(constants: ScoringConstants) -> Self {
        Self { constants }
    }

    /// Validate a whole rule set, including its field definitions
    pub fn validate(&self, rule_set: RuleSet) -> Result<ValidatedRuleSet, ConfigurationError> {
        let mut issues = self.rule_issues(&rule_set.rules);

        let mut field_names = HashSet::new();
        for field in &rule_set.fields {
            if !field_names.insert(field.name.as_str()) {
                issues.push(ConfigIssue::DuplicateField(field.name.clone()));
            }
            if !field.weight.is_finite() || field.weight < 0.0 {
                issues.push(ConfigIssue::InvalidFieldWeight {
                    name: field.name.clone(),
                    weight: field.weight,
                });
            }
        }

        for rule in rule_set.rules.iter().filter(|r| !r.is_gate() && !r.is_composite()) {
            if rule_set.field(&rule.field).is_none() {
                issues.push(ConfigIssue::UndefinedField {
                    rule_id: rule.id.clone(),
                    field: rule.field.clone(),
                });
            }
        }

        if !issues.is_empty() {
            tracing::warn!("Rejected rule set '{}' with {} issue(s)", rule_set.id, issues.len());
            return Err(ConfigurationError {
                rule_set_id: rule_set.id,
                issues,
            });
        }

        tracing::debug!("Rule set '{}' validated ({} rules)", rule_set.id, rule_set.rules.len());
        Ok(ValidatedRuleSet {
            inner: Arc::new(rule_set),
        })
    }

    /// Validate just the rules: gate flags and per-layer weight totals
    pub fn validate_rules(&self, rules: &[MatchingRule]) -> Result<(), ConfigurationError> {
        let issues = self.rule_issues(rules);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError {
                rule_set_id: String::new(),
                issues,
            })
        }
    }

    fn rule_issues(&self, rules: &[MatchingRule]) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let mut ids = HashSet::new();
        let mut layer_totals: BTreeMap<u8, f64> = BTreeMap::new();

        for rule in rules {
            if !ids.insert(rule.id.as_str()) {
                issues.push(ConfigIssue::DuplicateRuleId(rule.id.clone()));
            }

            if rule.layer == 0 {
                issues.push(ConfigIssue::InvalidLayer(rule.id.clone()));
                continue;
            }

            if !rule.weight.is_finite() || rule.weight < 0.0 {
                issues.push(ConfigIssue::InvalidWeight {
                    rule_id: rule.id.clone(),
                    weight: rule.weight,
                });
            }

            if rule.is_gate() {
                if !rule.mandatory {
                    issues.push(ConfigIssue::GateRuleNotMandatory(rule.id.clone()));
                }
                if !rule.enabled {
                    issues.push(ConfigIssue::GateRuleDisabled(rule.id.clone()));
                }
                continue;
            }

            if rule.is_composite() {
                issues.push(ConfigIssue::CompositeOutsideGate(rule.id.clone()));
            }

            if rule.enabled {
                *layer_totals.entry(rule.layer).or_insert(0.0) += rule.weight;
            }
        }

        let expected = self.constants.layer_weight_total;
        for (layer, total) in layer_totals {
            if (total - expected).abs() > self.constants.weight_tolerance {
                issues.push(ConfigIssue::LayerWeightTotal { layer, total, expected });
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldDefinition, FieldType};

    fn base() -> RuleSet {
        RuleSet::new("default")
            .with_field(FieldDefinition::new("experience", FieldType::Number))
            .with_field(FieldDefinition::new("wants", FieldType::Set))
            .with_rule(MatchingRule::gate("geo_city", "City + State", "city+state"))
    }

    #[test]
    fn test_valid_rule_set() {
        let rules = base()
            .with_rule(MatchingRule::scored("exp", "Experience", "experience", 2, 50.0))
            .with_rule(MatchingRule::scored("wants", "Wants", "wants", 2, 50.0));

        let validated = RuleSetValidator::default().validate(rules).unwrap();
        assert_eq!(validated.id, "default");
    }

    #[test]
    fn test_weights_not_100_rejected() {
        let rules = base()
            .with_rule(MatchingRule::scored("exp", "Experience", "experience", 2, 50.0))
            .with_rule(MatchingRule::scored("wants", "Wants", "wants", 2, 40.0));

        let err = RuleSetValidator::default().validate(rules).unwrap_err();
        assert_eq!(
            err.issues,
            vec![ConfigIssue::LayerWeightTotal { layer: 2, total: 90.0, expected: 100.0 }]
        );
        assert!(err.to_string().contains("90.0%"));
    }

    #[test]
    fn test_tolerance() {
        let rules = base()
            .with_rule(MatchingRule::scored("exp", "Experience", "experience", 2, 33.33))
            .with_rule(MatchingRule::scored("wants", "Wants", "wants", 2, 66.72));
        assert!(RuleSetValidator::default().validate(rules).is_ok());

        let rules = base()
            .with_rule(MatchingRule::scored("exp", "Experience", "experience", 2, 33.0))
            .with_rule(MatchingRule::scored("wants", "Wants", "wants", 2, 66.8));
        assert!(RuleSetValidator::default().validate(rules).is_err());
    }

    #[test]
    fn test_disabled_rules_excluded_from_total() {
        let rules = base()
            .with_rule(MatchingRule::scored("exp", "Experience", "experience", 2, 100.0))
            .with_rule(MatchingRule::scored("wants", "Wants", "wants", 2, 40.0).disabled());
        assert!(RuleSetValidator::default().validate(rules).is_ok());
    }

    #[test]
    fn test_each_layer_checked() {
        let rules = base()
            .with_rule(MatchingRule::scored("exp", "Experience", "experience", 2, 100.0))
            .with_rule(MatchingRule::scored("wants", "Wants", "wants", 3, 80.0));

        let err = RuleSetValidator::default().validate(rules).unwrap_err();
        assert!(matches!(err.issues[0], ConfigIssue::LayerWeightTotal { layer: 3, .. }));
    }

    #[test]
    fn test_gate_rule_cannot_be_disabled_or_optional() {
        let mut optional = MatchingRule::gate("zip", "Zip", "zip_codes");
        optional.mandatory = false;
        let disabled = MatchingRule::gate("county", "County", "county+state").disabled();

        let err = RuleSetValidator::default()
            .validate_rules(&[optional, disabled])
            .unwrap_err();
        assert!(err.issues.contains(&ConfigIssue::GateRuleNotMandatory("zip".into())));
        assert!(err.issues.contains(&ConfigIssue::GateRuleDisabled("county".into())));
    }

    #[test]
    fn test_structural_issues_collected() {
        let rules = base()
            .with_field(FieldDefinition::new("wants", FieldType::Set))
            .with_rule(MatchingRule::scored("exp", "Experience", "experience", 2, 100.0))
            .with_rule(MatchingRule::scored("exp", "Dup", "nope", 3, 100.0))
            .with_rule(MatchingRule::scored("geo2", "Geo", "county+state", 4, 100.0))
            .with_rule(MatchingRule::scored("zero", "Zero", "experience", 0, 0.0));

        let err = RuleSetValidator::default().validate(rules).unwrap_err();
        assert!(err.issues.contains(&ConfigIssue::DuplicateRuleId("exp".into())));
        assert!(err.issues.contains(&ConfigIssue::DuplicateField("wants".into())));
        assert!(err.issues.contains(&ConfigIssue::CompositeOutsideGate("geo2".into())));
        assert!(err.issues.contains(&ConfigIssue::InvalidLayer("zero".into())));
        assert!(err.issues.contains(&ConfigIssue::UndefinedField {
            rule_id: "exp".into(),
            field: "nope".into()
        }));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let rules = vec![
            MatchingRule::scored("a", "A", "a", 2, 120.0),
            MatchingRule::scored("b", "B", "b", 2, -20.0),
        ];
        let err = RuleSetValidator::default().validate_rules(&rules).unwrap_err();
        assert!(matches!(err.issues[0], ConfigIssue::InvalidWeight { .. }));
    }
}
