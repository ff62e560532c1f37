//! Key generator configuration.

use crate::value::{CacheValue, ValueKind};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const DEFAULT_PREFIX: &str = "easy_cache";
pub const DEFAULT_MAX_VALUE_LENGTH: usize = 100;
/// Hard key length limit of the common cache backends (memcached, Django).
pub const DEFAULT_MAX_KEY_LENGTH: usize = 250;
pub const DEFAULT_MAX_DEPTH: usize = 512;
pub const DEFAULT_RESERVED_KEYWORDS: [&str; 3] = ["request", "args", "kwargs"];

/// A type whose values are left out of cache keys.
///
/// Parsed from strings: names of built-in kinds (`"datetime"`, `"uuid"`,
/// ...) map to [`ExcludedType::Kind`], anything else is matched against the
/// declared type name of entity, enum, record, object and custom values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExcludedType {
    Kind(ValueKind),
    Named(String),
}

impl ExcludedType {
    pub fn named(name: impl Into<String>) -> Self {
        ExcludedType::Named(name.into())
    }

    pub fn matches(&self, kind: ValueKind, declared: Option<&str>) -> bool {
        match self {
            ExcludedType::Kind(k) => *k == kind,
            ExcludedType::Named(name) => declared == Some(name.as_str()),
        }
    }
}

impl From<ValueKind> for ExcludedType {
    fn from(kind: ValueKind) -> Self {
        ExcludedType::Kind(kind)
    }
}

impl From<&str> for ExcludedType {
    fn from(s: &str) -> Self {
        match s.parse::<ValueKind>() {
            Ok(kind) => ExcludedType::Kind(kind),
            Err(_) => ExcludedType::Named(s.trim().to_string()),
        }
    }
}

impl From<String> for ExcludedType {
    fn from(s: String) -> Self {
        ExcludedType::from(s.as_str())
    }
}

impl From<ExcludedType> for String {
    fn from(t: ExcludedType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for ExcludedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExcludedType::Kind(kind) => f.write_str(kind.as_str()),
            ExcludedType::Named(name) => f.write_str(name),
        }
    }
}

/// Ordered, de-duplicated set of types excluded from cache keys wherever
/// they occur.
///
/// The default set holds the inherently unstable kinds: `datetime`, `date`,
/// `time` and `uuid`. Durations, decimals and IP addresses are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ExcludedType>", into = "Vec<ExcludedType>")]
pub struct ExcludedTypeSet(Vec<ExcludedType>);

impl ExcludedTypeSet {
    /// An empty set: nothing is auto-excluded.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Returns `false` if the type was already present.
    pub fn insert(&mut self, excluded: impl Into<ExcludedType>) -> bool {
        let excluded = excluded.into();
        if self.0.contains(&excluded) {
            return false;
        }
        self.0.push(excluded);
        true
    }

    pub fn with(mut self, excluded: impl Into<ExcludedType>) -> Self {
        self.insert(excluded);
        self
    }

    pub fn contains_kind(&self, kind: ValueKind) -> bool {
        self.0.contains(&ExcludedType::Kind(kind))
    }

    /// Whether `value` is an instance of an excluded type. Shared values are
    /// judged by what they hold.
    pub fn matches(&self, value: &CacheValue) -> bool {
        if self.0.is_empty() {
            return false;
        }
        if let CacheValue::Shared(shared) = value {
            return shared
                .read()
                .map(|inner| !matches!(*inner, CacheValue::Shared(_)) && self.matches(&inner))
                .unwrap_or(false);
        }
        let kind = value.kind();
        let declared = value.declared_type_name();
        self.0.iter().any(|t| t.matches(kind, declared))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExcludedType> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ExcludedTypeSet {
    fn default() -> Self {
        Self::empty()
            .with(ValueKind::DateTime)
            .with(ValueKind::Date)
            .with(ValueKind::Time)
            .with(ValueKind::Uuid)
    }
}

impl From<Vec<ExcludedType>> for ExcludedTypeSet {
    fn from(types: Vec<ExcludedType>) -> Self {
        types.into_iter().fold(Self::empty(), ExcludedTypeSet::with)
    }
}

impl From<ExcludedTypeSet> for Vec<ExcludedType> {
    fn from(set: ExcludedTypeSet) -> Self {
        set.0
    }
}

impl<T: Into<ExcludedType>> FromIterator<T> for ExcludedTypeSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), ExcludedTypeSet::with)
    }
}

/// Configuration read once when a [`KeyGenerator`](super::KeyGenerator) is
/// constructed.
///
/// Every field has a default, so a YAML document only needs the keys it
/// overrides:
///
/// ```yaml
/// prefix: reports
/// max_value_length: 64
/// exclude_types: [datetime, uuid, Session]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyGeneratorConfig {
    /// Namespace in front of every key (`prefix:...`).
    pub prefix: String,
    /// Serialized arguments longer than this (in characters) are replaced
    /// by a 16 hex character hash.
    pub max_value_length: usize,
    /// Backend key length limit in bytes.
    pub max_key_length: usize,
    pub exclude_types: ExcludedTypeSet,
    /// Keyword arguments that never take part in keys.
    pub reserved_keywords: Vec<String>,
    /// Deepest container nesting accepted before an argument is rejected.
    pub max_depth: usize,
}

impl Default for KeyGeneratorConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            max_value_length: DEFAULT_MAX_VALUE_LENGTH,
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
            exclude_types: ExcludedTypeSet::default(),
            reserved_keywords: DEFAULT_RESERVED_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl KeyGeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_max_value_length(mut self, length: usize) -> Self {
        self.max_value_length = length;
        self
    }

    pub fn with_max_key_length(mut self, length: usize) -> Self {
        self.max_key_length = length;
        self
    }

    pub fn with_exclude_types(mut self, types: ExcludedTypeSet) -> Self {
        self.exclude_types = types;
        self
    }

    pub fn exclude(mut self, excluded: impl Into<ExcludedType>) -> Self {
        self.exclude_types.insert(excluded);
        self
    }

    /// Keep every value in keys, including timestamps and UUIDs.
    pub fn without_auto_exclude(mut self) -> Self {
        self.exclude_types = ExcludedTypeSet::empty();
        self
    }

    pub fn with_reserved_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn is_reserved_keyword(&self, name: &str) -> bool {
        self.reserved_keywords.iter().any(|k| k == name)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid key generator configuration: {}", e),
                ErrorContext::new().with_source("key_generator_config"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml).map_err(|e| match e {
            Error::Configuration { message, context } => Error::Configuration {
                message,
                context: context.with_details(format!("file: {}", path.display())),
            },
            other => other,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, msg: String| {
            Err(Error::configuration_with_context(
                msg,
                ErrorContext::new()
                    .with_field_path(field)
                    .with_source("key_generator_config"),
            ))
        };

        if self.prefix.is_empty() {
            return invalid("prefix", "prefix must not be empty".into());
        }
        if let Some(c) = self
            .prefix
            .chars()
            .find(|c| *c == ':' || c.is_whitespace() || c.is_control())
        {
            return invalid(
                "prefix",
                format!("prefix {:?} contains forbidden character {:?}", self.prefix, c),
            );
        }
        if self.max_value_length == 0 {
            return invalid("max_value_length", "max_value_length must be positive".into());
        }
        if self.max_key_length <= self.prefix.len() + 1 {
            return invalid(
                "max_key_length",
                format!(
                    "max_key_length {} leaves no room after prefix '{}'",
                    self.max_key_length, self.prefix
                ),
            );
        }
        if self.max_depth == 0 {
            return invalid("max_depth", "max_depth must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_map;

    #[test]
    fn test_defaults() {
        let config = KeyGeneratorConfig::default();
        assert_eq!(config.prefix, "easy_cache");
        assert_eq!(config.max_value_length, 100);
        assert_eq!(config.max_key_length, 250);
        assert!(config.is_reserved_keyword("request"));
        assert!(config.exclude_types.contains_kind(ValueKind::DateTime));
        assert!(config.exclude_types.contains_kind(ValueKind::Uuid));
        assert!(!config.exclude_types.contains_kind(ValueKind::Duration));
        assert!(!config.exclude_types.contains_kind(ValueKind::IpAddress));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_overrides_and_named_types() {
        let config = KeyGeneratorConfig::from_yaml_str(
            r#"
prefix: reports
max_value_length: 64
exclude_types: [datetime, UUID, Session, datetime]
"#,
        )
        .unwrap();
        assert_eq!(config.prefix, "reports");
        assert_eq!(config.max_value_length, 64);
        assert_eq!(config.max_key_length, 250);
        let types: Vec<_> = config.exclude_types.iter().map(|t| t.to_string()).collect();
        assert_eq!(types, ["datetime", "uuid", "Session"]);
    }

    #[test]
    fn test_named_exclusion_matches_declared_type() {
        let set = ExcludedTypeSet::empty().with("Session");
        assert!(set.matches(&CacheValue::entity("Session", 1)));
        assert!(!set.matches(&CacheValue::entity("User", 1)));
        assert!(!set.matches(&cache_map! { "Session" => 1 }));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = KeyGeneratorConfig::new()
            .with_prefix("a:b")
            .validate()
            .unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("prefix")
        );

        assert!(KeyGeneratorConfig::new().with_max_value_length(0).validate().is_err());
        assert!(KeyGeneratorConfig::new().with_max_key_length(5).validate().is_err());
        assert!(KeyGeneratorConfig::from_yaml_str("max_depth: [1, 2]").is_err());
    }

    #[test]
    fn test_from_path_reports_missing_file() {
        let err = KeyGeneratorConfig::from_path("/nonexistent/easy_cache.yaml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
