use crate::core::ScoringConstants;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub oracle: OracleSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub scoring: ScoringConstants,
    #[serde(default)]
    pub sink: SinkSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }

/// Semantic similarity oracle
#[derive(Debug, Clone, Deserialize)]
pub struct OracleSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: String,
    pub api_key: Option<String>,
    #[serde(default = "default_oracle_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_oracle_cache_size")]
    pub cache_size: u64,
    #[serde(default = "default_oracle_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: None,
            timeout_ms: default_oracle_timeout_ms(),
            cache_size: default_oracle_cache_size(),
            cache_ttl_secs: default_oracle_cache_ttl(),
        }
    }
}

fn default_oracle_timeout_ms() -> u64 { 3000 }
fn default_oracle_cache_size() -> u64 { 10_000 }
fn default_oracle_cache_ttl() -> u64 { 3600 }

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    /// TOML or JSON rule set file loaded at startup
    pub rules_path: Option<String>,
    #[serde(default = "default_rule_set")]
    pub default_rule_set: String,
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    #[serde(default = "default_max_batch_pairs")]
    pub max_batch_pairs: usize,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            rules_path: None,
            default_rule_set: default_rule_set(),
            batch_concurrency: default_batch_concurrency(),
            max_batch_pairs: default_max_batch_pairs(),
        }
    }
}

fn default_rule_set() -> String { "default".to_string() }
fn default_batch_concurrency() -> usize { 16 }
fn default_max_batch_pairs() -> usize { 10_000 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Log,
    Webhook,
}

/// Where commit-mode match intents go
#[derive(Debug, Clone, Deserialize)]
pub struct SinkSettings {
    #[serde(default)]
    pub kind: SinkKind,
    pub webhook_url: Option<String>,
    #[serde(default = "default_sink_timeout")]
    pub timeout_secs: u64,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            webhook_url: None,
            timeout_secs: default_sink_timeout(),
        }
    }
}

fn default_sink_timeout() -> u64 { 10 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with AGENT_MATCH__)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., AGENT_MATCH__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("AGENT_MATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        substitute_env_vars(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    ///
    /// Environment overrides and secret variables apply exactly as in [`Settings::load`].
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("AGENT_MATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        substitute_env_vars(settings)?.try_deserialize()
    }
}

/// Apply well-known secret variables that deployments set without the prefix
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if let Ok(api_key) = env::var("SIMILARITY_ORACLE_API_KEY") {
        builder = builder.set_override("oracle.api_key", api_key)?;
    }
    if let Ok(url) = env::var("MATCH_WEBHOOK_URL") {
        builder = builder
            .set_override("sink.webhook_url", url)?
            .set_override("sink.kind", "webhook")?;
    }

    builder.build()
}
