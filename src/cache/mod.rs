//! Content-addressed translation cache
//!
//! Maps (normalized text, source language, target language, model tier) to
//! a translated result. Exact lookup is O(1) by hashed key; a near-duplicate
//! lookup scans the same language pair and ranks candidates by token-set
//! Jaccard similarity. Cache unavailability never blocks translation: read
//! failures are misses, write failures are logged and swallowed.

mod error;
mod keys;
mod store;

pub use error::{CacheError, CacheResult};
pub use keys::{cache_key, language_pair_prefix, normalize_text, CACHE_VERSION};
pub use store::{CacheEntry, CacheStore, MemoryCacheStore, RedisCacheStore, SharedRedis};

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::metrics;
use crate::models::ModelTier;

/// An exact cache hit, including which tier's slot matched.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub tier: ModelTier,
    pub key: String,
    pub entry: CacheEntry,
}

/// A near-duplicate candidate from `find_similar`.
#[derive(Debug, Clone)]
pub struct SimilarEntry {
    pub similarity: f32,
    pub entry: CacheEntry,
}

#[derive(Clone)]
pub struct TranslationCache {
    store: Arc<dyn CacheStore>,
    ttl_secs: u64,
}

impl TranslationCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    pub fn in_memory(ttl_secs: u64) -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()), ttl_secs)
    }

    /// Exact lookup. Checks the preferred tier's slot first, then every
    /// cheaper tier, so a result produced by a fallback retry still counts.
    /// Store failures degrade to a miss.
    pub async fn lookup(
        &self,
        text: &str,
        source: &str,
        target: &str,
        preferred_tier: ModelTier,
    ) -> Option<CacheHit> {
        let normalized = normalize_text(text);

        for tier in preferred_tier.ladder() {
            let key = cache_key(&normalized, source, target, tier);
            match self.store.get(&key).await {
                Ok(Some(entry)) => {
                    metrics::record_cache_lookup("hit");
                    return Some(CacheHit { tier, key, entry });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, source, target_language = target, "cache lookup failed; treating as miss");
                    metrics::record_cache_lookup("error");
                }
            }
        }

        metrics::record_cache_lookup("miss");
        None
    }

    /// Store a translation result. Returns the derived cache key either way;
    /// a write failure is logged and swallowed.
    pub async fn store(
        &self,
        text: &str,
        source: &str,
        target: &str,
        tier: ModelTier,
        translated_text: &str,
        confidence: Option<f32>,
        model_used: &str,
    ) -> String {
        let normalized = normalize_text(text);
        let key = cache_key(&normalized, source, target, tier);
        let entry = CacheEntry {
            normalized_text: normalized,
            translated_text: translated_text.to_string(),
            confidence,
            model_used: model_used.to_string(),
            cached_at: Utc::now(),
        };

        if let Err(e) = self.store.put(&key, &entry, self.ttl_secs).await {
            warn!(error = %e, source, target_language = target, "cache store failed; continuing without cache");
        }
        key
    }

    /// Near-duplicate candidates for the same (source, target, tier) at or
    /// above `threshold`, ranked by similarity. Only used when a caller
    /// explicitly asks for best-effort reuse; never substituted silently.
    pub async fn find_similar(
        &self,
        text: &str,
        source: &str,
        target: &str,
        tier: ModelTier,
        threshold: f32,
    ) -> Vec<SimilarEntry> {
        let normalized = normalize_text(text);
        let prefix = language_pair_prefix(source, target, tier);

        let entries = match self.store.scan_prefix(&prefix).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, source, target_language = target, "cache scan failed; no similarity candidates");
                return Vec::new();
            }
        };

        let mut candidates: Vec<SimilarEntry> = entries
            .into_iter()
            .map(|entry| SimilarEntry {
                similarity: jaccard_similarity(&normalized, &entry.normalized_text),
                entry,
            })
            .filter(|c| c.similarity >= threshold)
            .collect();

        candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        candidates
    }
}

/// Token-set Jaccard similarity between two normalized texts.
pub fn jaccard_similarity(a: &str, b: &str) -> f32 {
    use std::collections::HashSet;

    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();

    if union == 0 {
        return 0.0;
    }

    intersection as f32 / union as f32
}
