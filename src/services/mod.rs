// Service exports
pub mod cache;
pub mod oracle;
pub mod rules;
pub mod sink;

pub use cache::{CacheKey, CacheStats, CachedOracle};
pub use oracle::HttpSimilarityOracle;
pub use rules::{RuleSetStore, RuleStoreError};
pub use sink::{ChannelSink, LoggingSink, WebhookSink};
