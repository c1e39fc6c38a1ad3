use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single field value on a pro or client record
///
/// Records arrive as loosely-shaped JSON, so values are kept in a closed
/// enum and coerced to the declared `FieldType` at comparison time.
/// Shapes no comparator understands (objects, nested lists) land in
/// `Other` and score as uncoercible instead of rejecting the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    #[serde(deserialize_with = "scalar_list")]
    List(Vec<String>),
    Other(serde_json::Value),
}

/// Accept a list of any JSON scalars, rendered as strings (`[78701]` -> `["78701"]`)
///
/// Nulls are dropped. A non-scalar element fails this variant.
fn scalar_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<serde_json::Value>::deserialize(deserializer)?
        .into_iter()
        .filter(|item| !item.is_null())
        .map(|item| match item {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Bool(b) => Ok(b.to_string()),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(format_number)
                .ok_or_else(|| D::Error::custom(format!("list number {} out of range", n))),
            other => Err(D::Error::custom(format!("list element {} is not a scalar", other))),
        })
        .collect()
}

impl FieldValue {
    /// Null and whitespace-only text count as missing data
    pub fn is_missing(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Render a scalar as a string (lists, null and other shapes have no scalar form)
    pub fn as_scalar_string(&self) -> Option<String> {
        match self {
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Number(n) => Some(format_number(*n)),
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Null | FieldValue::List(_) | FieldValue::Other(_) => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(value: Vec<&str>) -> Self {
        FieldValue::List(value.into_iter().map(str::to_string).collect())
    }
}

/// Integral floats render without a trailing ".0" so "10" and 10.0 normalize alike
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// A pro (candidate) or client (buyer) record
///
/// The engine only reads fields by name and never mutates the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: HashMap::new(),
        }
    }

    /// Builder-style field setter, mostly for tests and loaders
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a field, treating missing values as absent
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).filter(|v| !v.is_missing())
    }
}

/// Declared comparison type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[serde(alias = "array")]
    Set,
    #[serde(alias = "numeric")]
    Number,
    #[serde(alias = "bool")]
    Boolean,
    Enum,
    Text,
    /// Any type tag the engine does not understand; always scores 0
    #[serde(other)]
    Unknown,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Set => "set",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Enum => "enum",
            FieldType::Text => "text",
            FieldType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Field metadata owned by configuration storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub weight: f64,
    #[serde(default, alias = "semanticEnabled")]
    pub semantic_enabled: bool,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            weight: 0.0,
            semantic_enabled: false,
        }
    }

    pub fn semantic(mut self) -> Self {
        self.semantic_enabled = true;
        self
    }
}

/// Separator for composite rule fields such as `city+state`
pub const COMPOSITE_SEPARATOR: char = '+';

/// A single matching rule in a rule set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingRule {
    pub id: String,
    pub name: String,
    /// Pro-side field name; may be composite (`city+state`) for layer 1
    pub field: String,
    /// Client-side field name when it differs from `field`
    #[serde(default, alias = "clientField")]
    pub client_field: Option<String>,
    pub layer: u8,
    #[serde(default)]
    pub weight: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mandatory: bool,
}

fn default_true() -> bool {
    true
}

impl MatchingRule {
    /// A layer-1 gate rule; always mandatory and enabled
    pub fn gate(id: impl Into<String>, name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            field: field.into(),
            client_field: None,
            layer: 1,
            weight: 0.0,
            enabled: true,
            mandatory: true,
        }
    }

    /// A weighted scoring rule in `layer`
    pub fn scored(
        id: impl Into<String>,
        name: impl Into<String>,
        field: impl Into<String>,
        layer: u8,
        weight: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            field: field.into(),
            client_field: None,
            layer,
            weight,
            enabled: true,
            mandatory: false,
        }
    }

    pub fn with_client_field(mut self, client_field: impl Into<String>) -> Self {
        self.client_field = Some(client_field.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn client_field_name(&self) -> &str {
        self.client_field.as_deref().unwrap_or(&self.field)
    }

    pub fn is_gate(&self) -> bool {
        self.layer <= 1
    }

    pub fn is_composite(&self) -> bool {
        self.field.contains(COMPOSITE_SEPARATOR)
            || self.client_field_name().contains(COMPOSITE_SEPARATOR)
    }
}

/// Split a possibly-composite field reference into its components
pub fn field_components(field: &str) -> Vec<&str> {
    field
        .split(COMPOSITE_SEPARATOR)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect()
}

/// A complete weight configuration: field metadata plus rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Phrase used in `blocked_reason` when the gate fails
    #[serde(default = "default_gate_label", alias = "gateLabel")]
    pub gate_label: String,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub rules: Vec<MatchingRule>,
}

fn default_gate_label() -> String {
    "geographic overlap".to_string()
}

impl RuleSet {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            gate_label: default_gate_label(),
            fields: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_rule(mut self, rule: MatchingRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn gate_rules(&self) -> impl Iterator<Item = &MatchingRule> {
        self.rules.iter().filter(|r| r.is_gate())
    }

    /// Distinct scoring layers (>= 2), ascending
    pub fn scoring_layers(&self) -> Vec<u8> {
        let mut layers: Vec<u8> = self
            .rules
            .iter()
            .filter(|r| !r.is_gate())
            .map(|r| r.layer)
            .collect();
        layers.sort_unstable();
        layers.dedup();
        layers
    }
}

/// How a field score was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Overlap,
    Range,
    Semantic,
    None,
}

/// Score for one field pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldScore {
    pub field_name: String,
    pub score: f64,
    pub weighted_score: f64,
    pub match_type: MatchType,
    pub details: String,
}

impl FieldScore {
    pub fn new(field_name: impl Into<String>, score: f64, match_type: MatchType, details: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            score,
            weighted_score: 0.0,
            match_type,
            details: details.into(),
        }
    }

    pub fn none(field_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(field_name, 0.0, MatchType::None, details)
    }

    pub fn missing(field_name: impl Into<String>) -> Self {
        Self::none(field_name, "missing value(s)")
    }
}

/// The engine's output for a single pair evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchBreakdown {
    pub total_score: u8,
    pub field_scores: Vec<FieldScore>,
    pub layer1_passed: bool,
    pub blocked_reason: Option<String>,
    /// Set when a layer's enabled weights did not total 100 and were re-normalized
    #[serde(default)]
    pub fallback_normalization: bool,
}

impl MatchBreakdown {
    pub fn blocked(field_scores: Vec<FieldScore>, reason: String) -> Self {
        Self {
            total_score: 0,
            field_scores,
            layer1_passed: false,
            blocked_reason: Some(reason),
            fallback_normalization: false,
        }
    }

    /// Sum of all unrounded weighted field scores
    pub fn weighted_sum(&self) -> f64 {
        self.field_scores.iter().map(|s| s.weighted_score).sum()
    }
}

/// Whether a decision should result in a persisted match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Commit,
    #[default]
    Preview,
}

/// A breakdown plus the decision derived from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDecision {
    pub pro_id: String,
    pub client_id: String,
    pub rule_set_id: String,
    pub mode: MatchMode,
    pub would_create: bool,
    #[serde(flatten)]
    pub breakdown: MatchBreakdown,
    /// True when a commit-mode intent reached the sink
    pub intent_emitted: bool,
    pub evaluated_at: chrono::DateTime<chrono::Utc>,
}

/// Signal that a match record should be created by a persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchIntent {
    pub intent_id: uuid::Uuid,
    pub pro_id: String,
    pub client_id: String,
    pub rule_set_id: String,
    pub total_score: u8,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
