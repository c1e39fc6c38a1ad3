use crate::core::{ConfigurationError, RuleSetValidator, ValidatedRuleSet};
use crate::models::RuleSet;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur when loading or resolving rule sets
#[derive(Debug, Error)]
pub enum RuleStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(#[from] ConfigurationError),

    #[error("Rule set not found: {0}")]
    NotFound(String),

    #[error("Rule set id '{0}' appears more than once in one file")]
    DuplicateId(String),
}

/// On-disk shape: `[[rule_sets]]` in TOML or `{"rule_sets": [...]}` in JSON
#[derive(Debug, Deserialize)]
struct RuleSetFile {
    #[serde(default)]
    rule_sets: Vec<RuleSet>,
}

/// Holds the validated rule sets the service may evaluate against
///
/// Only validated sets are ever stored. Callers resolve a set once and
/// thread it through each evaluation explicitly.
pub struct RuleSetStore {
    validator: RuleSetValidator,
    default_id: String,
    sets: RwLock<HashMap<String, ValidatedRuleSet>>,
}

impl RuleSetStore {
    pub fn new(validator: RuleSetValidator, default_id: impl Into<String>) -> Self {
        Self {
            validator,
            default_id: default_id.into(),
            sets: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    /// Parse rule sets from TOML or JSON text, validating all before storing any
    pub async fn load_str(&self, content: &str, is_json: bool) -> Result<usize, RuleStoreError> {
        let file: RuleSetFile = if is_json {
            serde_json::from_str(content)?
        } else {
            toml::from_str(content)?
        };

        let mut ids = HashSet::new();
        if let Some(duplicate) = file.rule_sets.iter().find(|r| !ids.insert(r.id.as_str())) {
            return Err(RuleStoreError::DuplicateId(duplicate.id.clone()));
        }

        let validated = file
            .rule_sets
            .into_iter()
            .map(|rule_set| self.validator.validate(rule_set))
            .collect::<Result<Vec<_>, _>>()?;

        let count = validated.len();
        let mut sets = self.sets.write().await;
        for rule_set in validated {
            sets.insert(rule_set.id.clone(), rule_set);
        }

        Ok(count)
    }

    /// Load a rule set file; `.json` is parsed as JSON, anything else as TOML
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<usize, RuleStoreError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let is_json = path.extension().map(|e| e == "json").unwrap_or(false);

        let count = self.load_str(&content, is_json).await?;
        tracing::info!("Loaded {} rule set(s) from {}", count, path.display());
        Ok(count)
    }

    /// Validate and store a rule set, replacing any with the same id
    pub async fn upsert(&self, rule_set: RuleSet) -> Result<ValidatedRuleSet, RuleStoreError> {
        let validated = self.validator.validate(rule_set)?;
        self.sets
            .write()
            .await
            .insert(validated.id.clone(), validated.clone());
        tracing::info!("Activated rule set '{}'", validated.id);
        Ok(validated)
    }

    pub async fn get(&self, id: &str) -> Result<ValidatedRuleSet, RuleStoreError> {
        self.sets
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RuleStoreError::NotFound(id.to_string()))
    }

    /// Resolve an explicit id, or the default rule set when none is given
    pub async fn resolve(&self, id: Option<&str>) -> Result<ValidatedRuleSet, RuleStoreError> {
        self.get(id.unwrap_or(&self.default_id)).await
    }

    pub async fn len(&self) -> usize {
        self.sets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sets.read().await.is_empty()
    }
}
