//! Conversions from common Rust types into [`CacheValue`].

use super::CacheValue;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Conversion of a call argument into the key generator's value model.
///
/// Implemented for std scalars and collections, `chrono` date/time types,
/// `uuid::Uuid`, `bigdecimal::BigDecimal` and `bytes::Bytes`. Domain types
/// usually implement it by delegating to [`CacheValue::from_entity`],
/// [`CacheValue::from_fields`] or [`CacheValue::object`].
pub trait ToCacheValue {
    fn to_cache_value(&self) -> CacheValue;
}

impl<T: ToCacheValue + ?Sized> ToCacheValue for &T {
    fn to_cache_value(&self) -> CacheValue {
        (**self).to_cache_value()
    }
}

impl ToCacheValue for CacheValue {
    fn to_cache_value(&self) -> CacheValue {
        self.clone()
    }
}

impl ToCacheValue for bool {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Bool(*self)
    }
}

macro_rules! signed_to_cache_value {
    ($($ty:ty),*) => {
        $(impl ToCacheValue for $ty {
            fn to_cache_value(&self) -> CacheValue {
                CacheValue::Int(i64::from(*self))
            }
        })*
    };
}

macro_rules! unsigned_to_cache_value {
    ($($ty:ty),*) => {
        $(impl ToCacheValue for $ty {
            fn to_cache_value(&self) -> CacheValue {
                CacheValue::UInt(u64::from(*self))
            }
        })*
    };
}

signed_to_cache_value!(i8, i16, i32, i64);
unsigned_to_cache_value!(u8, u16, u32, u64);

impl ToCacheValue for isize {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Int(*self as i64)
    }
}

impl ToCacheValue for usize {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::UInt(*self as u64)
    }
}

impl ToCacheValue for f32 {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Float(f64::from(*self))
    }
}

impl ToCacheValue for f64 {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Float(*self)
    }
}

impl ToCacheValue for str {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Str(self.to_string())
    }
}

impl ToCacheValue for String {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Str(self.clone())
    }
}

impl ToCacheValue for char {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Str(self.to_string())
    }
}

impl ToCacheValue for bytes::Bytes {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Bytes(self.to_vec())
    }
}

impl ToCacheValue for BigDecimal {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Decimal(self.clone())
    }
}

impl<Tz: TimeZone> ToCacheValue for DateTime<Tz> {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::DateTime(self.fixed_offset())
    }
}

impl ToCacheValue for NaiveDateTime {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::NaiveDateTime(*self)
    }
}

impl ToCacheValue for NaiveDate {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Date(*self)
    }
}

impl ToCacheValue for NaiveTime {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Time(*self)
    }
}

impl ToCacheValue for chrono::Duration {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Duration(*self)
    }
}

impl ToCacheValue for Uuid {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Uuid(*self)
    }
}

impl ToCacheValue for IpAddr {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::IpAddr(*self)
    }
}

impl ToCacheValue for Ipv4Addr {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::IpAddr(IpAddr::V4(*self))
    }
}

impl ToCacheValue for Ipv6Addr {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::IpAddr(IpAddr::V6(*self))
    }
}

impl ToCacheValue for Path {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Path(self.to_path_buf())
    }
}

impl ToCacheValue for PathBuf {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Path(self.clone())
    }
}

impl<T: ToCacheValue> ToCacheValue for Option<T> {
    fn to_cache_value(&self) -> CacheValue {
        match self {
            Some(value) => value.to_cache_value(),
            None => CacheValue::Null,
        }
    }
}

impl<T: ToCacheValue> ToCacheValue for [T] {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::List(self.iter().map(ToCacheValue::to_cache_value).collect())
    }
}

impl<T: ToCacheValue, const N: usize> ToCacheValue for [T; N] {
    fn to_cache_value(&self) -> CacheValue {
        self.as_slice().to_cache_value()
    }
}

impl<T: ToCacheValue> ToCacheValue for Vec<T> {
    fn to_cache_value(&self) -> CacheValue {
        self.as_slice().to_cache_value()
    }
}

impl<T: ToCacheValue> ToCacheValue for VecDeque<T> {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::List(self.iter().map(ToCacheValue::to_cache_value).collect())
    }
}

impl<T: ToCacheValue, S> ToCacheValue for HashSet<T, S> {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Set(self.iter().map(ToCacheValue::to_cache_value).collect())
    }
}

impl<T: ToCacheValue> ToCacheValue for BTreeSet<T> {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Set(self.iter().map(ToCacheValue::to_cache_value).collect())
    }
}

impl<K: ToString, V: ToCacheValue, S> ToCacheValue for HashMap<K, V, S> {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Map(
            self.iter()
                .map(|(k, v)| (k.to_string(), v.to_cache_value()))
                .collect(),
        )
    }
}

impl<K: ToString, V: ToCacheValue> ToCacheValue for BTreeMap<K, V> {
    fn to_cache_value(&self) -> CacheValue {
        CacheValue::Map(
            self.iter()
                .map(|(k, v)| (k.to_string(), v.to_cache_value()))
                .collect(),
        )
    }
}

impl ToCacheValue for serde_json::Value {
    fn to_cache_value(&self) -> CacheValue {
        use serde_json::Value;
        match self {
            Value::Null => CacheValue::Null,
            Value::Bool(b) => CacheValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    CacheValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    CacheValue::UInt(u)
                } else {
                    CacheValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => CacheValue::Str(s.clone()),
            Value::Array(items) => CacheValue::List(items.iter().map(|v| v.to_cache_value()).collect()),
            Value::Object(map) => CacheValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_cache_value()))
                    .collect(),
            ),
        }
    }
}

macro_rules! tuple_to_cache_value {
    ($($name:ident),+) => {
        impl<$($name: ToCacheValue),+> ToCacheValue for ($($name,)+) {
            #[allow(non_snake_case)]
            fn to_cache_value(&self) -> CacheValue {
                let ($($name,)+) = self;
                CacheValue::Tuple(vec![$($name.to_cache_value()),+])
            }
        }
    };
}

tuple_to_cache_value!(A);
tuple_to_cache_value!(A, B);
tuple_to_cache_value!(A, B, C);
tuple_to_cache_value!(A, B, C, D);
tuple_to_cache_value!(A, B, C, D, E);
tuple_to_cache_value!(A, B, C, D, E, F);
