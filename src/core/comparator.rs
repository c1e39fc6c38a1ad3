use crate::models::{format_number, FieldScore, FieldType, FieldValue, MatchType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A percent-difference band: differences strictly below `below_pct` earn `score`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericBand {
    pub below_pct: f64,
    pub score: f64,
}

/// Product-tuned scoring constants
///
/// The defaults are the values the matching product has always used.
/// They are kept configurable rather than replaced by a smooth curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConstants {
    /// Bands checked in order; the first band whose limit exceeds the difference wins
    #[serde(default = "default_numeric_bands")]
    pub numeric_bands: Vec<NumericBand>,
    /// Ceiling for the substring fallback in free-text comparison
    #[serde(default = "default_substring_cap")]
    pub substring_cap: f64,
    /// Required enabled-weight total per scoring layer
    #[serde(default = "default_layer_weight_total")]
    pub layer_weight_total: f64,
    /// Absolute tolerance when checking layer weight totals
    #[serde(default = "default_weight_tolerance")]
    pub weight_tolerance: f64,
}

impl Default for ScoringConstants {
    fn default() -> Self {
        Self {
            numeric_bands: default_numeric_bands(),
            substring_cap: default_substring_cap(),
            layer_weight_total: default_layer_weight_total(),
            weight_tolerance: default_weight_tolerance(),
        }
    }
}

fn default_numeric_bands() -> Vec<NumericBand> {
    [(10.0, 90.0), (25.0, 70.0), (50.0, 50.0), (75.0, 30.0), (100.0, 10.0)]
        .into_iter()
        .map(|(below_pct, score)| NumericBand { below_pct, score })
        .collect()
}

fn default_substring_cap() -> f64 { 70.0 }
fn default_layer_weight_total() -> f64 { 100.0 }
fn default_weight_tolerance() -> f64 { 0.1 }

/// Normalize a single string for comparison
#[inline]
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Coerce a value into a normalized string set
///
/// Lists map element-wise; a scalar becomes a one-element set.
/// Blank entries are dropped.
pub fn to_set(value: &FieldValue) -> Option<BTreeSet<String>> {
    match value {
        FieldValue::List(items) => Some(
            items
                .iter()
                .map(|s| normalize(s))
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        FieldValue::Null => None,
        scalar => scalar
            .as_scalar_string()
            .map(|s| [normalize(&s)].into_iter().filter(|s| !s.is_empty()).collect()),
    }
}

/// Coerce a value into a number (numeric strings are accepted)
pub fn to_number(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Number(n) if n.is_finite() => Some(*n),
        FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        FieldValue::List(items) if items.len() == 1 => items[0].trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Coerce a value into a boolean
pub fn to_bool(value: &FieldValue) -> Option<bool> {
    match value {
        FieldValue::Bool(b) => Some(*b),
        FieldValue::Number(n) if *n == 0.0 || *n == 1.0 => Some(*n == 1.0),
        FieldValue::Text(s) => match normalize(s).as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Coerce a value into a normalized scalar string
pub fn to_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::List(items) if items.len() == 1 => Some(normalize(&items[0])),
        other => other.as_scalar_string().map(|s| normalize(&s)),
    }
}

/// Result of comparing one field pair before any weight is applied
///
/// `Text` is returned for free-text fields so the caller can route the pair
/// through the semantic scorer, which may need to suspend on the oracle.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Scored(FieldScore),
    Text { a: String, b: String },
}

/// Pure field comparators keyed by declared field type
#[derive(Debug, Clone, Default)]
pub struct FieldComparator {
    constants: ScoringConstants,
}

impl FieldComparator {
    pub fn new(constants: ScoringConstants) -> Self {
        Self { constants }
    }

    pub fn constants(&self) -> &ScoringConstants {
        &self.constants
    }

    /// Compare a field pair by declared type
    ///
    /// Missing values short-circuit before type dispatch.
    pub fn compare(
        &self,
        field_name: &str,
        field_type: FieldType,
        a: Option<&FieldValue>,
        b: Option<&FieldValue>,
    ) -> Comparison {
        let (a, b) = match (a, b) {
            (Some(a), Some(b)) if !a.is_missing() && !b.is_missing() => (a, b),
            _ => return Comparison::Scored(FieldScore::missing(field_name)),
        };

        let scored = match field_type {
            FieldType::Set => self.compare_sets(field_name, a, b),
            FieldType::Number => self.compare_numbers(field_name, a, b),
            FieldType::Boolean => compare_booleans(field_name, a, b),
            FieldType::Enum => compare_enums(field_name, a, b),
            FieldType::Text => {
                return match (to_text(a), to_text(b)) {
                    (Some(a), Some(b)) => Comparison::Text { a, b },
                    _ => Comparison::Scored(FieldScore::none(field_name, "value not coercible to text")),
                };
            }
            FieldType::Unknown => {
                tracing::warn!("Field '{}' has an unknown type, scoring 0", field_name);
                FieldScore::none(field_name, "unknown field type")
            }
        };

        Comparison::Scored(scored)
    }

    /// Jaccard overlap of normalized string sets
    pub fn compare_sets(&self, field_name: &str, a: &FieldValue, b: &FieldValue) -> FieldScore {
        let (set_a, set_b) = match (to_set(a), to_set(b)) {
            (Some(a), Some(b)) => (a, b),
            _ => return FieldScore::none(field_name, "value not coercible to set"),
        };

        if set_a.is_empty() || set_b.is_empty() {
            return FieldScore::new(field_name, 0.0, MatchType::Overlap, "empty set");
        }

        let shared: Vec<&String> = set_a.intersection(&set_b).collect();
        let union = set_a.union(&set_b).count();
        let score = 100.0 * shared.len() as f64 / union as f64;

        let details = if shared.is_empty() {
            format!("no overlap (0/{})", union)
        } else {
            let names: Vec<&str> = shared.iter().map(|s| s.as_str()).collect();
            format!("{}/{} shared: {}", shared.len(), union, names.join(", "))
        };

        FieldScore::new(field_name, score, MatchType::Overlap, details)
    }

    /// Banded percent-difference comparison
    pub fn compare_numbers(&self, field_name: &str, a: &FieldValue, b: &FieldValue) -> FieldScore {
        let (x, y) = match (to_number(a), to_number(b)) {
            (Some(x), Some(y)) => (x, y),
            _ => return FieldScore::none(field_name, "value not coercible to number"),
        };

        if x == y {
            return FieldScore::new(field_name, 100.0, MatchType::Exact, format!("both {}", format_number(x)));
        }

        let average = ((x + y) / 2.0).abs();
        if average == 0.0 {
            return FieldScore::new(field_name, 0.0, MatchType::Range, "zero average, treated as 100% different");
        }

        let percent_diff = (x - y).abs() / average * 100.0;
        let score = self.band_score(percent_diff);

        FieldScore::new(
            field_name,
            score,
            MatchType::Range,
            format!("{} vs {} ({:.1}% apart)", format_number(x), format_number(y), percent_diff),
        )
    }

    /// Map a percent difference onto the configured step function
    pub fn band_score(&self, percent_diff: f64) -> f64 {
        self.constants
            .numeric_bands
            .iter()
            .find(|band| percent_diff < band.below_pct)
            .map(|band| band.score)
            .unwrap_or(0.0)
    }
}

fn compare_booleans(field_name: &str, a: &FieldValue, b: &FieldValue) -> FieldScore {
    match (to_bool(a), to_bool(b)) {
        (Some(x), Some(y)) if x == y => FieldScore::new(field_name, 100.0, MatchType::Exact, format!("both {}", x)),
        (Some(x), Some(y)) => FieldScore::none(field_name, format!("{} vs {}", x, y)),
        _ => FieldScore::none(field_name, "value not coercible to boolean"),
    }
}

fn compare_enums(field_name: &str, a: &FieldValue, b: &FieldValue) -> FieldScore {
    match (to_text(a), to_text(b)) {
        (Some(x), Some(y)) if x == y => FieldScore::new(field_name, 100.0, MatchType::Exact, format!("both '{}'", x)),
        (Some(x), Some(y)) => FieldScore::none(field_name, format!("'{}' vs '{}'", x, y)),
        _ => FieldScore::none(field_name, "value not coercible to enum"),
    }
}
