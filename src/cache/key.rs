//! Cache key generation.

use super::canonical::{to_compact, to_pretty, Canonicalizer, EncodeError};
use super::config::KeyGeneratorConfig;
use super::signature::CallSignature;
use crate::error::ArgumentRef;
use crate::value::{CacheValue, QueryParams};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Characters that break common cache backends.
const PROBLEMATIC_CHARS: [char; 3] = ['\n', '\r', '\0'];
const HASH_LENGTH: usize = 16;

/// A validated, backend-safe cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A key together with the values it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedKey {
    pub key: CacheKey,
    /// `module.qualname` of the cached function.
    pub function_name: String,
    /// Canonical parameter string; its hash is part of the key.
    pub original_params: String,
    /// Readable rendering of the parameters: pretty-printed collections,
    /// never hashed or truncated.
    pub display_params: String,
}

/// Rejects keys longer than `max_length` bytes or containing `\n`, `\r` or
/// `\0`.
pub fn validate_cache_key(key: &str, max_length: usize) -> Result<()> {
    if key.len() > max_length {
        return Err(Error::key_validation_with_context(
            format!("Cache key too long: {} bytes", key.len()),
            ErrorContext::new()
                .with_field_path("max_key_length")
                .with_details(format!("limit: {}", max_length))
                .with_source("key_generator"),
        ));
    }
    if let Some(c) = key.chars().find(|c| PROBLEMATIC_CHARS.contains(c)) {
        return Err(Error::key_validation_with_context(
            format!("Cache key contains problematic character: {:?}", c),
            ErrorContext::new().with_source("key_generator"),
        ));
    }
    Ok(())
}

/// First 16 hex characters of the SHA-256 of `input`.
pub(crate) fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    digest[..HASH_LENGTH].to_string()
}

fn clean_scalar(token: &str) -> String {
    token
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\0' | ' ' => '_',
            other => other,
        })
        .collect()
}

#[derive(Default)]
struct Tokens {
    key: Vec<String>,
    display: Vec<String>,
}

impl Tokens {
    fn push(&mut self, name: Option<&str>, key: String, display: String) {
        match name {
            Some(name) => {
                self.key.push(format!("{}={}", name, key));
                self.display.push(format!("{}={}", name, display));
            }
            None => {
                self.key.push(key);
                self.display.push(display);
            }
        }
    }
}

/// Derives cache keys from call signatures.
///
/// Holds only immutable configuration, so one generator can be shared
/// across threads. Key format:
///
/// ```text
/// prefix:module.qualname_<16 hex of SHA-256(original_params)>[_YYYYMMDD_HHMMSS]
/// ```
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    config: Arc<KeyGeneratorConfig>,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self {
            config: Arc::new(KeyGeneratorConfig::default()),
        }
    }
}

impl KeyGenerator {
    /// Validates `config` once; the generator never re-reads it.
    pub fn new(config: KeyGeneratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &KeyGeneratorConfig {
        &self.config
    }

    pub fn generate_key(&self, call: &CallSignature) -> Result<GeneratedKey> {
        let function_name = call.function().to_string();
        let canonicalizer = Canonicalizer::new(&self.config);
        let mut tokens = Tokens::default();

        let offset = call.explicit_offset();
        for (index, arg) in call.explicit_args().iter().enumerate() {
            self.push_argument(
                &canonicalizer,
                &mut tokens,
                None,
                arg,
                ArgumentRef::Positional(offset + index),
                &function_name,
            )?;
        }

        for (name, value) in call.keywords() {
            if self.config.is_reserved_keyword(name) {
                trace!(keyword = %name, "skipping reserved keyword argument");
                continue;
            }
            self.push_argument(
                &canonicalizer,
                &mut tokens,
                Some(name),
                value,
                ArgumentRef::Keyword(name.clone()),
                &function_name,
            )?;
        }

        let original_params = tokens.key.join("&");
        let display_params = tokens.display.join("&");

        let mut key = format!(
            "{}:{}_{}",
            self.config.prefix,
            function_name,
            short_hash(&original_params)
        );
        if let Some(expires_at) = call.expiration() {
            key.push('_');
            key.push_str(&expires_at.format("%Y%m%d_%H%M%S").to_string());
        }
        validate_cache_key(&key, self.config.max_key_length)?;

        debug!(
            function = %function_name,
            key = %key,
            params = %original_params,
            "generated cache key"
        );

        Ok(GeneratedKey {
            key: CacheKey(key),
            function_name,
            original_params,
            display_params,
        })
    }

    fn push_argument(
        &self,
        canonicalizer: &Canonicalizer<'_>,
        tokens: &mut Tokens,
        name: Option<&str>,
        value: &CacheValue,
        argument: ArgumentRef,
        function_name: &str,
    ) -> Result<()> {
        let uncachable = |value: &CacheValue, argument: ArgumentRef, e: EncodeError| {
            Error::uncachable(argument, value.type_name(), function_name, e.to_string())
        };

        let resolved = self
            .resolve_shared(value)
            .map_err(|e| uncachable(value, argument.clone(), e))?;
        let value = resolved.as_ref().unwrap_or(value);

        if value.is_null() {
            return Ok(());
        }
        if canonicalizer.is_excluded(value) {
            trace!(argument = %argument, type_name = %value.type_name(), "excluded argument");
            return Ok(());
        }

        match value {
            CacheValue::Entity(entity) => {
                let token = entity.token();
                tokens.push(name, token.clone(), token);
            }
            CacheValue::Request(params) => {
                self.push_query_params(canonicalizer, tokens, params, function_name)?;
            }
            other if other.kind().is_collection() => {
                let encoded = canonicalizer
                    .encode(value)
                    .map_err(|e| uncachable(value, argument, e))?;
                let compact = to_compact(&encoded);
                tokens.push(name, self.bound_length(compact), to_pretty(&encoded));
            }
            _ => {
                let encoded = canonicalizer
                    .encode(value)
                    .map_err(|e| uncachable(value, argument, e))?;
                let compact = to_compact(&encoded);
                tokens.push(name, self.process_scalar(&compact), compact);
            }
        }
        Ok(())
    }

    /// Follows shared handles down to the first value that is not itself
    /// shared, so a wrapped entity or request keeps its own token form.
    /// Returns `None` when `value` is not shared.
    fn resolve_shared(
        &self,
        value: &CacheValue,
    ) -> std::result::Result<Option<CacheValue>, EncodeError> {
        let CacheValue::Shared(shared) = value else {
            return Ok(None);
        };
        let mut seen = HashSet::new();
        let mut current = shared.clone();
        loop {
            if !seen.insert(current.id()) {
                return Err(EncodeError::CircularReference);
            }
            if seen.len() > self.config.max_depth {
                return Err(EncodeError::TooDeep {
                    limit: self.config.max_depth,
                });
            }
            match current.snapshot().ok_or(EncodeError::Poisoned)? {
                CacheValue::Shared(next) => current = next,
                other => return Ok(Some(other)),
            }
        }
    }

    fn push_query_params(
        &self,
        canonicalizer: &Canonicalizer<'_>,
        tokens: &mut Tokens,
        params: &QueryParams,
        function_name: &str,
    ) -> Result<()> {
        for (key, value) in params.iter() {
            if value.is_null() || canonicalizer.is_excluded(value) {
                continue;
            }
            let encoded = canonicalizer.encode(value).map_err(|e| {
                Error::uncachable(
                    ArgumentRef::QueryParameter(key.to_string()),
                    value.type_name(),
                    function_name,
                    e.to_string(),
                )
            })?;
            let compact = to_compact(&encoded);
            tokens.push(Some(key), self.process_scalar(&compact), compact);
        }
        Ok(())
    }

    fn bound_length(&self, token: String) -> String {
        if token.chars().count() > self.config.max_value_length {
            short_hash(&token)
        } else {
            token
        }
    }

    fn process_scalar(&self, token: &str) -> String {
        if token.chars().count() > self.config.max_value_length {
            short_hash(token)
        } else {
            clean_scalar(token)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_map;
    use crate::value::{SharedValue, ToCacheValue};
    use chrono::{TimeZone, Utc};

    fn generate(call: &CallSignature) -> GeneratedKey {
        KeyGenerator::default().generate_key(call).unwrap()
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash(""), "e3b0c44298fc1c14");
        assert_eq!(short_hash("[1,2,3]"), "a615eeaee21de517");
    }

    #[test]
    fn test_key_layout() {
        let call = CallSignature::for_function("reports", "monthly")
            .arg(1)
            .arg("hello world")
            .kwarg("status", "active");
        let generated = generate(&call);
        assert_eq!(generated.original_params, r#"1&"hello_world"&status="active""#);
        assert_eq!(generated.display_params, r#"1&"hello world"&status="active""#);
        assert_eq!(generated.function_name, "reports.monthly");
        assert_eq!(
            generated.key.as_str(),
            "easy_cache:reports.monthly_0db26ac075825624"
        );
    }

    #[test]
    fn test_no_arguments_hash_the_empty_string() {
        let generated = generate(&CallSignature::for_function("reports", "all"));
        assert_eq!(generated.original_params, "");
        assert_eq!(generated.key.as_str(), "easy_cache:reports.all_e3b0c44298fc1c14");
    }

    #[test]
    fn test_collection_tokens_and_display() {
        let call = CallSignature::for_function("m", "f")
            .kwarg("tags", vec!["a", "b"])
            .kwarg("limit", 10);
        let generated = generate(&call);
        assert_eq!(generated.original_params, r#"tags=["a","b"]&limit=10"#);
        assert_eq!(
            generated.display_params,
            "tags=[\n  \"a\",\n  \"b\"\n]&limit=10"
        );
        assert!(generated.key.as_str().ends_with("_d5c8acb5e8124f2f"));
    }

    #[test]
    fn test_long_values_are_hashed() {
        let long = "a".repeat(120);
        let generated = generate(
            &CallSignature::for_function("m", "f").arg(cache_map! { "x" => long.clone() }),
        );
        assert_eq!(generated.original_params, "ccc41887bd4819e8");

        let generated = generate(&CallSignature::for_function("m", "f").arg(long));
        assert_eq!(generated.original_params.len(), 16);
    }

    #[test]
    fn test_request_parameters_are_folded() {
        let call = CallSignature::for_function("m", "f")
            .arg(QueryParams::parse("?page=2&q=a+b"))
            .kwarg("report", 42)
            .kwarg("request", "ignored");
        let generated = generate(&call);
        assert_eq!(generated.original_params, r#"page="2"&q="a_b"&report=42"#);
        assert!(generated.key.as_str().ends_with("_e221824ab69ba94f"));
    }

    #[test]
    fn test_entities_use_type_and_id() {
        let call = CallSignature::for_function("m", "f")
            .arg(CacheValue::entity("User", 7))
            .kwarg("owner", CacheValue::entity("Team", 3));
        assert_eq!(generate(&call).original_params, "User:7&owner=Team:3");
    }

    #[test]
    fn test_nested_shared_arguments_keep_their_token_form() {
        let entity = SharedValue::new(SharedValue::new(CacheValue::entity("User", 7)));
        let request = SharedValue::new(SharedValue::new(QueryParams::parse("page=2")));
        let call = CallSignature::for_function("m", "f")
            .arg(entity.to_cache_value())
            .arg(request.to_cache_value());
        assert_eq!(generate(&call).original_params, r#"User:7&page="2""#);

        let plain = CallSignature::for_function("m", "f")
            .arg(CacheValue::entity("User", 7))
            .arg(QueryParams::parse("page=2"));
        assert_eq!(generate(&call).key, generate(&plain).key);
    }

    #[test]
    fn test_self_wrapping_shared_argument_is_a_cycle() {
        let shared = SharedValue::new(0);
        let handle = shared.clone();
        shared.update(|v| *v = handle.to_cache_value());

        let call = CallSignature::for_function("m", "f").arg(shared.to_cache_value());
        let err = KeyGenerator::default().generate_key(&call).unwrap_err();
        assert!(err.to_string().contains("circular reference detected"));
    }

    #[test]
    fn test_null_and_excluded_arguments_contribute_nothing() {
        let call = CallSignature::for_function("m", "f")
            .arg(Option::<i32>::None)
            .arg(Utc::now())
            .arg(1)
            .kwarg("trace_id", uuid::Uuid::new_v4());
        assert_eq!(generate(&call).original_params, "1");
    }

    #[test]
    fn test_expiration_suffix() {
        let expires = Utc.with_ymd_and_hms(2025, 9, 5, 14, 30, 0).unwrap();
        let call = CallSignature::for_function("m", "f").with_expiration(expires);
        assert_eq!(
            generate(&call).key.as_str(),
            "easy_cache:m.f_e3b0c44298fc1c14_20250905_143000"
        );
    }

    #[test]
    fn test_uncachable_argument_names_position_and_type() {
        let shared = SharedValue::new(cache_map! { "a" => 1 });
        let handle = shared.clone();
        shared.update(|v| v.insert("self", &handle));

        let call = CallSignature::for_method("m", "Svc.f")
            .arg("receiver")
            .arg(1)
            .arg(shared.to_cache_value());
        let err = KeyGenerator::default().generate_key(&call).unwrap_err();
        match err {
            Error::UncachableArgument {
                argument,
                type_name,
                function,
                reason,
            } => {
                assert_eq!(argument, ArgumentRef::Positional(2));
                assert_eq!(type_name, "dict");
                assert_eq!(function, "m.Svc.f");
                assert_eq!(reason, "circular reference detected");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_cache_key() {
        assert!(validate_cache_key("easy_cache:ok", 250).is_ok());
        assert!(validate_cache_key(&"k".repeat(251), 250).is_err());
        let err = validate_cache_key("bad\nkey", 250).unwrap_err();
        assert!(err.to_string().contains(r"'\n'"));
    }

    #[test]
    fn test_over_long_function_name_fails_validation() {
        let call = CallSignature::for_function("m", "f".repeat(300));
        let err = KeyGenerator::default().generate_key(&call).unwrap_err();
        assert!(matches!(err, Error::KeyValidation { .. }));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(KeyGenerator::new(KeyGeneratorConfig::new().with_prefix("")).is_err());
    }
}
