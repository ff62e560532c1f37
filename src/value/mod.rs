//! 参数值模型：缓存键推导所使用的封闭变体集合。
//!
//! # Argument Value Model
//!
//! Every argument handed to the key generator is first converted into a
//! [`CacheValue`]. The variant set is closed: scalars, collections, and a
//! handful of "capability" variants that replace runtime duck typing with
//! explicit declarations.
//!
//! | Variant group | Source |
//! |---------------|--------|
//! | scalars | [`ToCacheValue`] impls for std, `chrono`, `uuid`, `bigdecimal` types |
//! | collections | `Vec`, slices, tuples, `HashMap`/`BTreeMap`, `HashSet`/`BTreeSet` |
//! | persisted entities | [`PersistedEntity`] via [`CacheValue::from_entity`] |
//! | records | [`CacheFields`] via [`CacheValue::from_fields`] |
//! | request-like values | [`QueryParams`] |
//! | custom fallback | [`CustomArgument`] via [`CacheValue::custom`] |
//! | shared (possibly cyclic) values | [`SharedValue`] |
//!
//! ## Example
//!
//! ```rust
//! use easy_cache::cache_map;
//! use easy_cache::value::{CacheValue, ToCacheValue};
//!
//! let filters = cache_map! {
//!     "status" => "active",
//!     "page" => 2,
//!     "tags" => CacheValue::set(["a", "b"]),
//! };
//! assert_eq!(filters.type_name(), "dict");
//! assert_eq!(42.to_cache_value().type_name(), "int");
//! ```

mod capability;
mod convert;
mod query;
mod shared;

pub use capability::{
    CacheFields, CustomArgument, EntityRef, EnumMember, ObjectValue, PersistedEntity, Record,
    RecordField,
};
pub use convert::ToCacheValue;
pub use query::QueryParams;
pub use shared::SharedValue;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// A call argument reduced to the closed set of shapes the key generator
/// understands.
///
/// Mappings keep their insertion order here; ordering is only normalized
/// during canonicalization. Duplicate map keys resolve to the last entry.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Decimal(BigDecimal),
    /// Timezone-aware timestamp.
    DateTime(DateTime<FixedOffset>),
    /// Timestamp without timezone information.
    NaiveDateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Duration(chrono::Duration),
    Uuid(Uuid),
    IpAddr(IpAddr),
    Path(PathBuf),
    Map(Vec<(String, CacheValue)>),
    List(Vec<CacheValue>),
    /// Ordered like a list; never sorted.
    Tuple(Vec<CacheValue>),
    Set(Vec<CacheValue>),
    FrozenSet(Vec<CacheValue>),
    Entity(EntityRef),
    Enum(EnumMember),
    Record(Record),
    Object(ObjectValue),
    Request(QueryParams),
    Custom(Arc<dyn CustomArgument>),
    Shared(SharedValue),
}

/// Runtime type tag of a [`CacheValue`].
///
/// Used by the exclusion policy and as the type half of the total order
/// applied to set elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    Decimal,
    #[serde(rename = "datetime")]
    DateTime,
    Date,
    Time,
    Duration,
    Uuid,
    IpAddress,
    Path,
    #[serde(rename = "dict")]
    Map,
    List,
    Tuple,
    Set,
    #[serde(rename = "frozenset")]
    FrozenSet,
    Entity,
    Enum,
    Record,
    Object,
    Request,
    Custom,
}

impl ValueKind {
    pub const ALL: [ValueKind; 25] = [
        ValueKind::Null,
        ValueKind::Bool,
        ValueKind::Int,
        ValueKind::Float,
        ValueKind::Str,
        ValueKind::Bytes,
        ValueKind::Decimal,
        ValueKind::DateTime,
        ValueKind::Date,
        ValueKind::Time,
        ValueKind::Duration,
        ValueKind::Uuid,
        ValueKind::IpAddress,
        ValueKind::Path,
        ValueKind::Map,
        ValueKind::List,
        ValueKind::Tuple,
        ValueKind::Set,
        ValueKind::FrozenSet,
        ValueKind::Entity,
        ValueKind::Enum,
        ValueKind::Record,
        ValueKind::Object,
        ValueKind::Request,
        ValueKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Bytes => "bytes",
            ValueKind::Decimal => "decimal",
            ValueKind::DateTime => "datetime",
            ValueKind::Date => "date",
            ValueKind::Time => "time",
            ValueKind::Duration => "duration",
            ValueKind::Uuid => "uuid",
            ValueKind::IpAddress => "ip_address",
            ValueKind::Path => "path",
            ValueKind::Map => "dict",
            ValueKind::List => "list",
            ValueKind::Tuple => "tuple",
            ValueKind::Set => "set",
            ValueKind::FrozenSet => "frozenset",
            ValueKind::Entity => "entity",
            ValueKind::Enum => "enum",
            ValueKind::Record => "record",
            ValueKind::Object => "object",
            ValueKind::Request => "request",
            ValueKind::Custom => "custom",
        }
    }

    /// Mapping, sequence or set kinds.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            ValueKind::Map
                | ValueKind::List
                | ValueKind::Tuple
                | ValueKind::Set
                | ValueKind::FrozenSet
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a built-in [`ValueKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value kind '{0}'")]
pub struct UnknownValueKind(pub String);

impl FromStr for ValueKind {
    type Err = UnknownValueKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let alias = match normalized.as_str() {
            "none" | "nonetype" => "null",
            "boolean" => "bool",
            "integer" => "int",
            "string" => "str",
            "date_time" => "datetime",
            "timedelta" => "duration",
            "ip" | "ipaddr" | "ip_addr" => "ip_address",
            "map" | "mapping" => "dict",
            "frozen_set" => "frozenset",
            other => other,
        };
        ValueKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == alias)
            .ok_or_else(|| UnknownValueKind(s.to_string()))
    }
}

impl CacheValue {
    /// Runtime type tag. Shared values report the kind of what they hold.
    pub fn kind(&self) -> ValueKind {
        match self {
            CacheValue::Null => ValueKind::Null,
            CacheValue::Bool(_) => ValueKind::Bool,
            CacheValue::Int(_) | CacheValue::UInt(_) => ValueKind::Int,
            CacheValue::Float(_) => ValueKind::Float,
            CacheValue::Str(_) => ValueKind::Str,
            CacheValue::Bytes(_) => ValueKind::Bytes,
            CacheValue::Decimal(_) => ValueKind::Decimal,
            CacheValue::DateTime(_) | CacheValue::NaiveDateTime(_) => ValueKind::DateTime,
            CacheValue::Date(_) => ValueKind::Date,
            CacheValue::Time(_) => ValueKind::Time,
            CacheValue::Duration(_) => ValueKind::Duration,
            CacheValue::Uuid(_) => ValueKind::Uuid,
            CacheValue::IpAddr(_) => ValueKind::IpAddress,
            CacheValue::Path(_) => ValueKind::Path,
            CacheValue::Map(_) => ValueKind::Map,
            CacheValue::List(_) => ValueKind::List,
            CacheValue::Tuple(_) => ValueKind::Tuple,
            CacheValue::Set(_) => ValueKind::Set,
            CacheValue::FrozenSet(_) => ValueKind::FrozenSet,
            CacheValue::Entity(_) => ValueKind::Entity,
            CacheValue::Enum(_) => ValueKind::Enum,
            CacheValue::Record(_) => ValueKind::Record,
            CacheValue::Object(_) => ValueKind::Object,
            CacheValue::Request(_) => ValueKind::Request,
            CacheValue::Custom(_) => ValueKind::Custom,
            CacheValue::Shared(shared) => shared.kind(),
        }
    }

    /// Name of the user-declared type for entity, enum, record, object and
    /// custom values.
    pub fn declared_type_name(&self) -> Option<&str> {
        match self {
            CacheValue::Entity(e) => Some(&e.type_name),
            CacheValue::Enum(m) => Some(&m.type_name),
            CacheValue::Record(r) => Some(&r.type_name),
            CacheValue::Object(o) => Some(&o.type_name),
            CacheValue::Custom(c) => Some(c.type_name()),
            _ => None,
        }
    }

    /// Type name used in error messages and set ordering: the declared
    /// type name when there is one, the [`ValueKind`] name otherwise.
    pub fn type_name(&self) -> String {
        match self {
            CacheValue::Shared(shared) => shared.type_name(),
            other => other
                .declared_type_name()
                .map(str::to_string)
                .unwrap_or_else(|| other.kind().as_str().to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CacheValue::Null)
    }

    pub fn map<K, V, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToCacheValue,
    {
        CacheValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_cache_value()))
                .collect(),
        )
    }

    pub fn list<V, I>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToCacheValue,
    {
        CacheValue::List(items.into_iter().map(|v| v.to_cache_value()).collect())
    }

    pub fn tuple<V, I>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToCacheValue,
    {
        CacheValue::Tuple(items.into_iter().map(|v| v.to_cache_value()).collect())
    }

    pub fn set<V, I>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToCacheValue,
    {
        CacheValue::Set(items.into_iter().map(|v| v.to_cache_value()).collect())
    }

    pub fn frozen_set<V, I>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToCacheValue,
    {
        CacheValue::FrozenSet(items.into_iter().map(|v| v.to_cache_value()).collect())
    }

    /// `TypeName:identifier` reference to a persisted row.
    pub fn entity(type_name: impl Into<String>, id: impl fmt::Display) -> Self {
        CacheValue::Entity(EntityRef::new(type_name, id))
    }

    pub fn from_entity<E: PersistedEntity + ?Sized>(entity: &E) -> Self {
        CacheValue::Entity(EntityRef::new(entity.entity_type(), entity.entity_id()))
    }

    pub fn enum_member(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        CacheValue::Enum(EnumMember::new(type_name, member))
    }

    pub fn from_fields<R: CacheFields + ?Sized>(record: &R) -> Self {
        CacheValue::Record(Record::new(record.type_name(), record.cache_fields()))
    }

    /// An object described by its attribute dictionary.
    pub fn object<K, V, I>(type_name: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToCacheValue,
    {
        CacheValue::Object(ObjectValue::new(type_name, attributes))
    }

    pub fn custom<C: CustomArgument + 'static>(value: C) -> Self {
        CacheValue::Custom(Arc::new(value))
    }

    /// Insert into a map value, replacing an existing entry with the same key
    /// in place. Returns `false` if `self` is not a map.
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToCacheValue) -> bool {
        let CacheValue::Map(entries) = self else {
            return false;
        };
        let key = key.into();
        let value = value.to_cache_value();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => entries.push((key, value)),
        }
        true
    }
}

/// Build a [`CacheValue::Map`] from `key => value` pairs.
///
/// Values may be of any type implementing [`ToCacheValue`].
#[macro_export]
macro_rules! cache_map {
    () => {
        $crate::value::CacheValue::Map(::std::vec::Vec::new())
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::value::CacheValue::Map(::std::vec![
            $((
                ::std::string::String::from($key),
                $crate::value::ToCacheValue::to_cache_value(&$value),
            )),+
        ])
    };
}

/// Build a [`CacheValue::List`] from heterogeneous values.
#[macro_export]
macro_rules! cache_list {
    () => {
        $crate::value::CacheValue::List(::std::vec::Vec::new())
    };
    ($($value:expr),+ $(,)?) => {
        $crate::value::CacheValue::List(::std::vec![
            $($crate::value::ToCacheValue::to_cache_value(&$value)),+
        ])
    };
}
