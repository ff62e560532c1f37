//! Shared, interiorly mutable values. The only way to build a cyclic
//! argument graph, which the canonicalizer must reject.

use super::{CacheValue, ToCacheValue, ValueKind};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard};

#[derive(Clone)]
pub struct SharedValue(Arc<RwLock<CacheValue>>);

impl SharedValue {
    pub fn new(value: impl ToCacheValue) -> Self {
        Self(Arc::new(RwLock::new(value.to_cache_value())))
    }

    /// Mutate the held value. Returns `None` if the lock is poisoned.
    pub fn update<R>(&self, f: impl FnOnce(&mut CacheValue) -> R) -> Option<R> {
        self.0.write().ok().map(|mut guard| f(&mut guard))
    }

    /// Clone of the held value (one level; nested shared values stay shared).
    pub fn snapshot(&self) -> Option<CacheValue> {
        self.read().map(|guard| guard.clone())
    }

    /// Identity of the allocation, used for cycle detection.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn read(&self) -> Option<RwLockReadGuard<'_, CacheValue>> {
        self.0.read().ok()
    }

    /// Kind of the held value. A shared value directly holding another
    /// shared value, or a poisoned one, reports [`ValueKind::Custom`].
    pub(crate) fn kind(&self) -> ValueKind {
        match self.read() {
            Some(guard) => match &*guard {
                CacheValue::Shared(_) => ValueKind::Custom,
                inner => inner.kind(),
            },
            None => ValueKind::Custom,
        }
    }

    pub(crate) fn type_name(&self) -> String {
        match self.read() {
            Some(guard) => match &*guard {
                CacheValue::Shared(_) => "shared".to_string(),
                inner => inner.type_name(),
            },
            None => "shared".to_string(),
        }
    }
}

impl fmt::Debug for SharedValue {
    // Never descend: the held value may point back to this one.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedValue")
            .field(&format_args!("{:#x}", self.id()))
            .finish()
    }
}

impl ToCacheValue for SharedValue {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Shared(self.clone())
    }
}
