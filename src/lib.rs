//! # easy-cache
//!
//! 函数结果缓存的确定性缓存键生成库。
//!
//! Deterministic cache-key generation for memoizing function results.
//!
//! ## Overview
//!
//! Given a function call (identity, positional arguments, keyword arguments
//! and an optional expiration instant) the [`cache::KeyGenerator`] produces a
//! canonical, order-independent text of the arguments and a short,
//! backend-safe key derived from it. Semantically identical calls map to the
//! same key across processes, whatever the order of their maps and sets.
//!
//! ## Core Ideas
//!
//! - **Closed value model**: arguments are converted into [`value::CacheValue`]
//!   through [`value::ToCacheValue`]; capability traits replace runtime probing
//! - **Unstable types excluded**: timestamps and UUIDs are dropped at any depth
//! - **Explicit configuration**: [`cache::KeyGeneratorConfig`] is passed at
//!   construction, never read from global state
//! - **Fail fast**: cycles, over-deep nesting and values without a stable
//!   string form are reported as [`Error::UncachableArgument`]
//!
//! ## Quick Start
//!
//! ```rust
//! use easy_cache::cache::{CallSignature, KeyGenerator};
//! use easy_cache::value::CacheValue;
//!
//! let generator = KeyGenerator::default();
//! let call = CallSignature::for_method("billing.services", "InvoiceService.totals")
//!     .arg("service instance")
//!     .arg(CacheValue::entity("Customer", 42))
//!     .kwarg("currency", "EUR");
//!
//! let generated = generator.generate_key(&call)?;
//! assert_eq!(generated.original_params, r#"Customer:42&currency="EUR""#);
//! # Ok::<(), easy_cache::Error>(())
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`value`] | Argument value model and conversions |
//! | [`cache`] | Key generation, configuration, stores and the get-or-compute layer |
//! | [`error`] | Error types |

pub mod cache;
pub mod value;

pub use cache::{
    validate_cache_key, CacheKey, CallSignature, GeneratedKey, KeyGenerator, KeyGeneratorConfig,
    SmartCache,
};
pub use value::{CacheValue, ToCacheValue};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{ArgumentRef, Error, ErrorContext};
