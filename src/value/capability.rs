//! Capabilities an argument type can declare instead of being inspected at runtime.

use super::{CacheValue, ToCacheValue};
use std::fmt;

/// A value backed by a persisted row with a stable identifier.
///
/// Canonicalizes to `TypeName:identifier`, so two in-memory instances of
/// the same row produce the same key regardless of their other state.
pub trait PersistedEntity {
    fn entity_type(&self) -> &str;
    fn entity_id(&self) -> String;
}

/// Declares which of a type's own fields participate in cache-key
/// derivation. Fields declared unstable are left out entirely.
pub trait CacheFields {
    fn type_name(&self) -> &str;
    fn cache_fields(&self) -> Vec<RecordField>;
}

/// Last-resort encoding for types outside the built-in variant set.
///
/// If [`attributes`](CustomArgument::attributes) returns a dictionary it is
/// used (minus `_`-prefixed names, after the exclusion filter); otherwise
/// the stable string form is used. Implementations must not embed memory
/// addresses or other per-process identifiers in either.
pub trait CustomArgument: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &str;

    fn attributes(&self) -> Option<Vec<(String, CacheValue)>> {
        None
    }

    fn stable_repr(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub type_name: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(type_name: impl Into<String>, id: impl fmt::Display) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.to_string(),
        }
    }

    /// `TypeName:identifier`
    pub fn token(&self) -> String {
        format!("{}:{}", self.type_name, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumMember {
    pub type_name: String,
    pub member: String,
}

impl EnumMember {
    pub fn new(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            member: member.into(),
        }
    }

    /// `EnumTypeName.MemberName`
    pub fn token(&self) -> String {
        format!("{}.{}", self.type_name, self.member)
    }
}

#[derive(Debug, Clone)]
pub struct RecordField {
    pub name: String,
    pub value: CacheValue,
    pub stable: bool,
}

impl RecordField {
    /// A field that participates in the cache key.
    pub fn stable(name: impl Into<String>, value: impl ToCacheValue) -> Self {
        Self {
            name: name.into(),
            value: value.to_cache_value(),
            stable: true,
        }
    }

    /// A field that is ignored for cache-key purposes.
    pub fn unstable(name: impl Into<String>, value: impl ToCacheValue) -> Self {
        Self {
            name: name.into(),
            value: value.to_cache_value(),
            stable: false,
        }
    }
}

/// Immutable record (dataclass equivalent).
#[derive(Debug, Clone)]
pub struct Record {
    pub type_name: String,
    pub fields: Vec<RecordField>,
}

impl Record {
    pub fn new(type_name: impl Into<String>, fields: Vec<RecordField>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    pub fn stable_fields(&self) -> impl Iterator<Item = &RecordField> {
        self.fields.iter().filter(|f| f.stable)
    }
}

/// Arbitrary object described by its attribute dictionary.
#[derive(Debug, Clone)]
pub struct ObjectValue {
    pub type_name: String,
    pub attributes: Vec<(String, CacheValue)>,
}

impl ObjectValue {
    pub fn new<K, V, I>(type_name: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToCacheValue,
    {
        Self {
            type_name: type_name.into(),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_cache_value()))
                .collect(),
        }
    }

    /// Attributes not marked private with a leading underscore.
    pub fn public_attributes(&self) -> impl Iterator<Item = (&str, &CacheValue)> {
        self.attributes
            .iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .map(|(name, value)| (name.as_str(), value))
    }
}
