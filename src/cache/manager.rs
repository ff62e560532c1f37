//! Cache manager: memoizes function results under generated keys.

use super::backend::CacheStore;
use super::key::{GeneratedKey, KeyGenerator};
use super::signature::CallSignature;
use crate::{Error, Result};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for calls without an expiration instant.
    pub default_ttl: Duration,
    pub enabled: bool,
    /// Run the function uncached when its arguments cannot be keyed,
    /// instead of returning the error.
    pub bypass_on_key_error: bool,
    /// Serialized results larger than this many bytes are not stored.
    pub max_entry_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            enabled: true,
            bypass_on_key_error: false,
            max_entry_size: 10 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_bypass_on_key_error(mut self, bypass: bool) -> Self {
        self.bypass_on_key_error = bypass;
        self
    }

    pub fn with_max_entry_size(mut self, bytes: usize) -> Self {
        self.max_entry_size = bytes;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Caches function results in a [`CacheStore`] under keys derived by a
/// [`KeyGenerator`].
///
/// Inside [`get_or_compute`](Self::get_or_compute) store and payload
/// failures never fail the call: they are counted, logged and the function
/// runs uncached. The explicit [`get`](Self::get) and [`set`](Self::set)
/// return them instead.
pub struct SmartCache {
    generator: KeyGenerator,
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
    stats: Arc<AtomicStats>,
}

impl SmartCache {
    pub fn new(generator: KeyGenerator, store: Arc<dyn CacheStore>) -> Self {
        Self {
            generator,
            store,
            config: CacheConfig::default(),
            stats: Arc::new(AtomicStats::default()),
        }
    }

    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn generator(&self) -> &KeyGenerator {
        &self.generator
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the cached result for `call`, or run `compute` and cache
    /// what it returns.
    pub async fn get_or_compute<T, F, Fut>(&self, call: &CallSignature, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.config.enabled {
            return Ok(compute().await);
        }

        let generated = match self.generator.generate_key(call) {
            Ok(generated) => generated,
            Err(e) if self.config.bypass_on_key_error => {
                AtomicStats::bump(&self.stats.errors);
                warn!(
                    function = %call.function(),
                    error = %e,
                    "cache key generation failed, running uncached"
                );
                return Ok(compute().await);
            }
            Err(e) => return Err(e),
        };

        if let Some(value) = self.lookup::<T>(&generated).await {
            return Ok(value);
        }

        let value = compute().await;
        self.store_result(call, &generated, &value).await;
        Ok(value)
    }

    /// Cached result for `call`, if any.
    ///
    /// Unlike [`get_or_compute`](Self::get_or_compute), an entry that does
    /// not decode as `T` is an [`Error::Serialization`], and store failures
    /// are returned.
    pub async fn get<T: DeserializeOwned>(&self, call: &CallSignature) -> Result<Option<T>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let generated = self.generator.generate_key(call)?;
        let data = match self.store.get(&generated.key).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                AtomicStats::bump(&self.stats.misses);
                return Ok(None);
            }
            Err(e) => {
                AtomicStats::bump(&self.stats.errors);
                return Err(e);
            }
        };
        let value = serde_json::from_slice(&data).map_err(|e| {
            AtomicStats::bump(&self.stats.errors);
            Error::from(e)
        })?;
        AtomicStats::bump(&self.stats.hits);
        Ok(Some(value))
    }

    /// Store `value` as the result for `call`. Returns whether it was
    /// stored; expired calls and oversized payloads are skipped.
    pub async fn set<T: Serialize>(&self, call: &CallSignature, value: &T) -> Result<bool> {
        if !self.config.enabled {
            return Ok(false);
        }
        let generated = self.generator.generate_key(call)?;
        self.put(call, &generated, value).await
    }

    /// Remove the cached result for `call`. Returns whether an entry existed.
    pub async fn invalidate(&self, call: &CallSignature) -> Result<bool> {
        let generated = self.generator.generate_key(call)?;
        match self.store.delete(&generated.key).await {
            Ok(deleted) => {
                if deleted {
                    AtomicStats::bump(&self.stats.deletes);
                }
                debug!(
                    function = %generated.function_name,
                    key = %generated.key,
                    deleted,
                    "invalidated cache entry"
                );
                Ok(deleted)
            }
            Err(e) => {
                AtomicStats::bump(&self.stats.errors);
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    async fn lookup<T: DeserializeOwned>(&self, generated: &GeneratedKey) -> Option<T> {
        match self.store.get(&generated.key).await {
            Ok(Some(data)) => match serde_json::from_slice(&data) {
                Ok(value) => {
                    AtomicStats::bump(&self.stats.hits);
                    debug!(
                        function = %generated.function_name,
                        key = %generated.key,
                        "cache hit"
                    );
                    Some(value)
                }
                Err(e) => {
                    AtomicStats::bump(&self.stats.errors);
                    AtomicStats::bump(&self.stats.misses);
                    warn!(key = %generated.key, error = %e, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => {
                AtomicStats::bump(&self.stats.misses);
                debug!(
                    function = %generated.function_name,
                    key = %generated.key,
                    params = %generated.display_params,
                    "cache miss"
                );
                None
            }
            Err(e) => {
                AtomicStats::bump(&self.stats.errors);
                AtomicStats::bump(&self.stats.misses);
                warn!(key = %generated.key, error = %e, "cache lookup failed");
                None
            }
        }
    }

    async fn store_result<T: Serialize>(
        &self,
        call: &CallSignature,
        generated: &GeneratedKey,
        value: &T,
    ) {
        if let Err(e) = self.put(call, generated, value).await {
            warn!(key = %generated.key, error = %e, "failed to cache result");
        }
    }

    /// Serialize and store `value`. `Ok(false)` means the entry was
    /// deliberately skipped: already expired or over `max_entry_size`.
    async fn put<T: Serialize>(
        &self,
        call: &CallSignature,
        generated: &GeneratedKey,
        value: &T,
    ) -> Result<bool> {
        let ttl = match call.expiration() {
            Some(expires_at) => match (expires_at - Utc::now()).to_std() {
                Ok(ttl) if !ttl.is_zero() => ttl,
                _ => {
                    debug!(key = %generated.key, "expiration already passed, not storing");
                    return Ok(false);
                }
            },
            None => self.config.default_ttl,
        };

        let data = serde_json::to_vec(value).map_err(|e| {
            AtomicStats::bump(&self.stats.errors);
            Error::from(e)
        })?;
        if data.len() > self.config.max_entry_size {
            debug!(
                key = %generated.key,
                size = data.len(),
                limit = self.config.max_entry_size,
                "result too large to cache"
            );
            return Ok(false);
        }

        match self.store.set(&generated.key, &data, ttl).await {
            Ok(()) => {
                AtomicStats::bump(&self.stats.sets);
                debug!(
                    function = %generated.function_name,
                    key = %generated.key,
                    ttl_secs = ttl.as_secs(),
                    "stored result"
                );
                Ok(true)
            }
            Err(e) => {
                AtomicStats::bump(&self.stats.errors);
                Err(e)
            }
        }
    }
}
