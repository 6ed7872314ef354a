//! Pluggable cache backends
//!
//! The cache is an injectable service with an explicit store backend: redis
//! in production, an in-memory map in tests. Swapping in a size-bounded
//! backend only requires another `CacheStore` implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::error::CacheResult;

/// A cached translation result for one normalized input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Normalized source text, kept for similarity matching.
    pub normalized_text: String,
    pub translated_text: String,
    pub confidence: Option<f32>,
    pub model_used: String,
    pub cached_at: DateTime<Utc>,
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    async fn put(&self, key: &str, entry: &CacheEntry, ttl_secs: u64) -> CacheResult<()>;

    /// Live entries whose key starts with `prefix` (one language pair and
    /// tier). Feeds the similarity lookup.
    async fn scan_prefix(&self, prefix: &str) -> CacheResult<Vec<CacheEntry>>;
}

/// Shared Redis connection manager
pub type SharedRedis = Arc<Mutex<ConnectionManager>>;

/// Redis-backed store. Expiry is native (`SET .. EX`); a jitter is added to
/// the TTL to prevent synchronized expiry across entries.
#[derive(Clone)]
pub struct RedisCacheStore {
    redis: SharedRedis,
}

impl RedisCacheStore {
    pub async fn connect(client: &redis::Client) -> CacheResult<Self> {
        let manager = client.get_connection_manager().await?;
        Ok(Self {
            redis: Arc::new(Mutex::new(manager)),
        })
    }

    pub fn new(redis: SharedRedis) -> Self {
        Self { redis }
    }

    fn add_jitter(ttl_secs: u64) -> u64 {
        let jitter_percent = (rand::random::<u32>() % 10) as f64 / 100.0;
        let jitter = (ttl_secs as f64 * jitter_percent).round() as u64;
        ttl_secs + jitter
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let mut conn = self.redis.lock().await;
        match conn.get::<_, Option<String>>(key).await? {
            Some(data) => match serde_json::from_str::<CacheEntry>(&data) {
                Ok(entry) => Ok(Some(entry)),
                Err(e) => {
                    warn!(key = %key, error = %e, "cache deserialization failed; evicting entry");
                    let _ = conn.del::<_, ()>(key).await;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, entry: &CacheEntry, ttl_secs: u64) -> CacheResult<()> {
        let data = serde_json::to_string(entry)?;
        let ttl_with_jitter = Self::add_jitter(ttl_secs);

        let mut conn = self.redis.lock().await;
        conn.set_ex::<_, _, ()>(key, data, ttl_with_jitter).await?;

        debug!(key = %key, ttl = ttl_with_jitter, "cache set");
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> CacheResult<Vec<CacheEntry>> {
        let pattern = format!("{}:*", prefix);
        let mut conn = self.redis.lock().await;
        let mut cursor: u64 = 0;
        let mut keys: Vec<String> = Vec::new();

        loop {
            // SCAN instead of KEYS to avoid blocking the server
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await?;
            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(data) = conn.get::<_, Option<String>>(&key).await? {
                match serde_json::from_str::<CacheEntry>(&data) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!(key = %key, error = %e, "skipping undecodable cache entry"),
                }
            }
        }
        Ok(entries)
    }
}

/// In-memory store for tests and single-process deployments. Expired
/// entries are evicted lazily on access.
#[derive(Default, Clone)]
pub struct MemoryCacheStore {
    inner: Arc<RwLock<HashMap<String, TimedEntry>>>,
}

#[derive(Clone)]
struct TimedEntry {
    entry: CacheEntry,
    stored_at: Instant,
    ttl_secs: u64,
}

impl TimedEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed().as_secs() >= self.ttl_secs
    }
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        {
            let guard = self.inner.read().await;
            match guard.get(key) {
                Some(timed) if !timed.is_expired() => return Ok(Some(timed.entry.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // expired: evict lazily
        self.inner.write().await.remove(key);
        Ok(None)
    }

    async fn put(&self, key: &str, entry: &CacheEntry, ttl_secs: u64) -> CacheResult<()> {
        let mut guard = self.inner.write().await;
        guard.insert(
            key.to_string(),
            TimedEntry {
                entry: entry.clone(),
                stored_at: Instant::now(),
                ttl_secs,
            },
        );
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> CacheResult<Vec<CacheEntry>> {
        let guard = self.inner.read().await;
        Ok(guard
            .iter()
            .filter(|(key, timed)| key.starts_with(prefix) && !timed.is_expired())
            .map(|(_, timed)| timed.entry.clone())
            .collect())
    }
}
