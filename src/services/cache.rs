use crate::core::{OracleError, Similarity, SimilarityOracle};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cache key for a similarity verdict
pub struct CacheKey;

impl CacheKey {
    /// Key for a (context, text_a, text_b) triple; inputs are already normalized
    ///
    /// Parts are joined with the ASCII unit separator, which free text and
    /// rule names do not contain, so `:` inside a part cannot shift the split.
    pub fn similarity(context: &str, a: &str, b: &str) -> String {
        format!("similarity\u{1f}{}\u{1f}{}\u{1f}{}", context.to_lowercase(), a, b)
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
}

/// In-memory TTL cache in front of a similarity oracle
///
/// Only successful verdicts are cached, so a flapping oracle is retried
/// on the next evaluation instead of pinning a fallback score.
pub struct CachedOracle {
    inner: Arc<dyn SimilarityOracle>,
    cache: moka::future::Cache<String, Similarity>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedOracle {
    pub fn new(inner: Arc<dyn SimilarityOracle>, max_entries: u64, ttl_secs: u64) -> Self {
        let cache = moka::future::CacheBuilder::new(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            inner,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
        }
    }

    /// Drop every cached verdict
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

#[async_trait]
impl SimilarityOracle for CachedOracle {
    async fn similarity(&self, a: &str, b: &str, context: &str) -> Result<Similarity, OracleError> {
        let key = CacheKey::similarity(context, a, b);

        if let Some(hit) = self.cache.get(&key).await {
            tracing::trace!("Similarity cache hit: {}", key);
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let verdict = self.inner.similarity(a, b, context).await?;
        self.cache.insert(key, verdict.clone()).await;

        Ok(verdict)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
