//! 缓存键模块：为函数调用生成确定性、后端安全的缓存键。
//!
//! # Cache Key Module
//!
//! Derives deterministic cache keys from function calls and memoizes their
//! results in a pluggable store.
//!
//! ## Overview
//!
//! Keys must be:
//! - stable for semantically identical arguments, whatever the container order
//! - different for different arguments
//! - insensitive to unstable argument types such as timestamps and UUIDs
//! - safe for the backend's length and character limits
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`KeyGenerator`] | Canonicalizes call arguments and derives the key |
//! | [`KeyGeneratorConfig`] | Prefix, length limits, excluded types, reserved keywords |
//! | [`CallSignature`] | Function identity, arguments and optional expiration |
//! | [`GeneratedKey`] | The key plus the canonical parameter strings behind it |
//! | [`SmartCache`] | Get-or-compute layer with statistics |
//! | [`CacheStore`] | Trait for implementing external stores |
//! | [`MemoryStore`] | In-process LRU store with TTL |
//! | [`NullStore`] | No-op store for disabling caching |
//!
//! ## Example
//!
//! ```rust
//! use easy_cache::cache::{CallSignature, KeyGenerator, KeyGeneratorConfig};
//! use easy_cache::cache_map;
//!
//! let generator = KeyGenerator::new(KeyGeneratorConfig::default().with_prefix("reports"))?;
//! let call = CallSignature::for_function("reports.views", "monthly")
//!     .arg(2025)
//!     .kwarg("filters", cache_map! { "status" => "active", "region" => "eu" });
//!
//! let generated = generator.generate_key(&call)?;
//! assert!(generated.key.as_str().starts_with("reports:reports.views.monthly_"));
//! assert_eq!(
//!     generated.original_params,
//!     r#"2025&filters={"region":"eu","status":"active"}"#
//! );
//! # Ok::<(), easy_cache::Error>(())
//! ```
//!
//! ## Key Format
//!
//! `prefix:module.qualname_<hash>[_YYYYMMDD_HHMMSS]`, where `<hash>` is the
//! first 16 hex characters of the SHA-256 of the canonical parameter string
//! and the optional suffix is the expiration instant in UTC.

mod backend;
mod canonical;
mod config;
mod key;
mod manager;
mod signature;

pub use backend::{CacheStore, MemoryStore, NullStore, DEFAULT_MEMORY_CAPACITY};
pub use config::{
    ExcludedType, ExcludedTypeSet, KeyGeneratorConfig, DEFAULT_MAX_DEPTH,
    DEFAULT_MAX_KEY_LENGTH, DEFAULT_MAX_VALUE_LENGTH, DEFAULT_PREFIX, DEFAULT_RESERVED_KEYWORDS,
};
pub use key::{validate_cache_key, CacheKey, GeneratedKey, KeyGenerator};
pub use manager::{CacheConfig, CacheStats, SmartCache};
pub use signature::{CallSignature, CallableKind, FunctionIdentity};
