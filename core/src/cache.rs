use async_trait::async_trait;
use moka::Expiry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::retry::RetryPolicy;
use crate::Result;

/// Lifetime of every entry written by the query engine.
pub const CACHE_TTL_SECS: u64 = 600;

/// Key-value cache in front of the index store. Values are opaque strings.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Delete keys matching `pattern`, where a trailing `*` matches any
    /// suffix. Returns the number of keys removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64>;
}

fn matches_pattern(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

/// Default bound on the number of live entries in a [`MemoryCache`].
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

#[derive(Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

// Each entry expires `ttl` after its last write.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Process-local cache on `moka`, bounded in size, with per-entry expiry.
/// Expired entries are reclaimed by moka's housekeeping, not only on read.
pub struct MemoryCache {
    entries: moka::future::Cache<String, Entry>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        let entries = moka::future::Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { entries }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).await.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let entry = Entry { value: value.to_string(), ttl: Duration::from_secs(ttl_secs) };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let matching: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(key, _)| matches_pattern(pattern, key))
            .map(|(key, _)| key)
            .collect();
        for key in &matching {
            self.entries.invalidate(key.as_str()).await;
        }
        Ok(matching.len() as u64)
    }
}

/// Wraps a [`Cache`] with a retry policy. Every failure is absorbed: reads
/// degrade to a miss and writes are dropped, each with a warning.
#[derive(Clone)]
pub struct ResilientCache {
    inner: Arc<dyn Cache>,
    retry: RetryPolicy,
}

impl ResilientCache {
    pub fn new(inner: Arc<dyn Cache>, retry: RetryPolicy) -> Self {
        Self { inner, retry }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let inner = &self.inner;
        match self.retry.run("cache_get", move || inner.get(key)).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Cached value decoded from JSON. Undecodable payloads count as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key, error = %err, "malformed cache payload, treating as miss");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl_secs: u64) {
        let inner = &self.inner;
        let res = self
            .retry
            .run("cache_set", move || inner.set(key, value, ttl_secs))
            .await;
        if let Err(err) = res {
            tracing::warn!(key, error = %err, "cache write failed");
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: u64) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw, ttl_secs).await,
            Err(err) => tracing::warn!(key, error = %err, "could not encode cache payload"),
        }
    }

    pub async fn delete(&self, key: &str) {
        let inner = &self.inner;
        if let Err(err) = self.retry.run("cache_delete", move || inner.delete(key)).await {
            tracing::warn!(key, error = %err, "cache invalidation failed");
        }
    }

    pub async fn delete_pattern(&self, pattern: &str) {
        let inner = &self.inner;
        match self
            .retry
            .run("cache_delete_pattern", move || inner.delete_pattern(pattern))
            .await
        {
            Ok(removed) => tracing::debug!(pattern, removed, "cache pattern invalidated"),
            Err(err) => tracing::warn!(pattern, error = %err, "cache pattern invalidation failed"),
        }
    }
}
