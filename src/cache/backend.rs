//! Cache store implementations.

use super::key::CacheKey;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const DEFAULT_MEMORY_CAPACITY: usize = 1000;

struct Entry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Async seam to the store holding cached payloads.
///
/// Implementations for Redis, memcached and the like live outside this
/// crate; keys arrive already validated.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &CacheKey) -> Result<bool>;
    async fn exists(&self, key: &CacheKey) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

/// In-process store: least recently used entries are evicted once
/// `capacity` is reached, expired entries are dropped on access.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, Entry>>,
}

impl MemoryStore {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock().map(|entries| entries.cap().get()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<String, Entry>>> {
        self.entries.lock().map_err(|e| {
            Error::store_with_context(
                format!("Failed to acquire memory store lock: {}", e),
                ErrorContext::new().with_source("memory_store"),
            )
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        let expired = match entries.get(key.as_str()) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.data.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key.as_str());
        }
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        entries.put(
            key.as_str().to_string(),
            Entry {
                data: value.to_vec(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.lock()?.pop(key.as_str()).is_some())
    }

    async fn exists(&self, key: &CacheKey) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .lock()?
            .peek(key.as_str())
            .map(|e| !e.is_expired(now))
            .unwrap_or(false))
    }

    async fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let now = Instant::now();
        Ok(self
            .lock()?
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .count())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Store that keeps nothing; every lookup misses.
#[derive(Debug, Default)]
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheStore for NullStore {
    async fn get(&self, _: &CacheKey) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
    async fn set(&self, _: &CacheKey, _: &[u8], _: Duration) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn exists(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
