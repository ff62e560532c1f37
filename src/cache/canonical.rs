//! Canonical structured encoding of argument values.
//!
//! Values are encoded into [`Canonical`] trees whose JSON-like textual form
//! is deterministic:
//!
//! - mapping keys are sorted, duplicates resolve to the last entry;
//! - set and frozenset elements are sorted by `(type name, string form)` and
//!   equal elements collapse into one;
//! - lists and tuples keep their order;
//! - values of an excluded type are dropped from mappings, sequences and
//!   sets at every depth;
//! - everything outside plain JSON goes through a fixed fallback encoder;
//! - non-finite floats are written as the bare tokens `NaN`, `Infinity` and
//!   `-Infinity`, which no string argument can produce.

use super::config::KeyGeneratorConfig;
use crate::value::{CacheValue, CustomArgument, SharedValue};
use base64::Engine;
use chrono::SecondsFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{trace, warn};

static MEMORY_ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"0x[0-9a-fA-F]{6,}").unwrap());

/// Encoded form of an argument value.
///
/// Mirrors the JSON data model, plus the bare non-finite float tokens that
/// `serde_json::Value` cannot hold.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Canonical {
    Null,
    Bool(bool),
    Number(Number),
    NonFinite(&'static str),
    Str(String),
    Array(Vec<Canonical>),
    Object(BTreeMap<String, Canonical>),
}

impl Canonical {
    fn write_compact(&self, out: &mut String) {
        match self {
            Canonical::Null => out.push_str("null"),
            Canonical::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Canonical::Number(n) => out.push_str(&n.to_string()),
            Canonical::NonFinite(token) => out.push_str(token),
            Canonical::Str(s) => write_string(out, s),
            Canonical::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_compact(out);
                }
                out.push(']');
            }
            Canonical::Object(entries) => {
                out.push('{');
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_string(out, key);
                    out.push(':');
                    value.write_compact(out);
                }
                out.push('}');
            }
        }
    }

    /// Same layout as `serde_json::to_string_pretty`.
    fn write_pretty(&self, out: &mut String, indent: usize) {
        match self {
            Canonical::Array(items) if !items.is_empty() => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    newline(out, indent + 1);
                    item.write_pretty(out, indent + 1);
                }
                newline(out, indent);
                out.push(']');
            }
            Canonical::Object(entries) if !entries.is_empty() => {
                out.push('{');
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    newline(out, indent + 1);
                    write_string(out, key);
                    out.push_str(": ");
                    value.write_pretty(out, indent + 1);
                }
                newline(out, indent);
                out.push('}');
            }
            other => other.write_compact(out),
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push_str(&Value::from(s).to_string());
}

fn newline(out: &mut String, indent: usize) {
    out.push('\n');
    for _ in 0..indent {
        out.push_str("  ");
    }
}

/// Why a value could not be reduced to a deterministic form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EncodeError {
    CircularReference,
    TooDeep { limit: usize },
    Poisoned,
    Custom { type_name: String, reason: String },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::CircularReference => f.write_str("circular reference detected"),
            EncodeError::TooDeep { limit } => {
                write!(f, "nesting exceeds the maximum depth of {}", limit)
            }
            EncodeError::Poisoned => f.write_str("shared value is poisoned"),
            EncodeError::Custom { type_name, reason } => {
                write!(f, "string form of '{}' failed: {}", type_name, reason)
            }
        }
    }
}

#[derive(Default)]
struct EncodeState {
    /// Shared values currently being encoded, by allocation identity.
    active: HashSet<usize>,
}

pub(crate) struct Canonicalizer<'a> {
    config: &'a KeyGeneratorConfig,
}

impl<'a> Canonicalizer<'a> {
    pub(crate) fn new(config: &'a KeyGeneratorConfig) -> Self {
        Self { config }
    }

    pub(crate) fn is_excluded(&self, value: &CacheValue) -> bool {
        self.config.exclude_types.matches(value)
    }

    pub(crate) fn encode(&self, value: &CacheValue) -> Result<Canonical, EncodeError> {
        let mut state = EncodeState::default();
        self.encode_value(value, &mut state, 0)
    }

    fn encode_value(
        &self,
        value: &CacheValue,
        state: &mut EncodeState,
        depth: usize,
    ) -> Result<Canonical, EncodeError> {
        if depth > self.config.max_depth {
            return Err(EncodeError::TooDeep {
                limit: self.config.max_depth,
            });
        }
        let encoded = match value {
            CacheValue::Null => Canonical::Null,
            CacheValue::Bool(b) => Canonical::Bool(*b),
            CacheValue::Int(i) => Canonical::Number(Number::from(*i)),
            CacheValue::UInt(u) => Canonical::Number(Number::from(*u)),
            CacheValue::Float(f) => encode_float(*f),
            CacheValue::Str(s) => Canonical::Str(s.clone()),
            CacheValue::Bytes(b) => {
                Canonical::Str(base64::engine::general_purpose::STANDARD.encode(b))
            }
            CacheValue::Decimal(d) => Canonical::Str(d.normalized().to_string()),
            CacheValue::DateTime(dt) => {
                Canonical::Str(dt.to_rfc3339_opts(SecondsFormat::Micros, false))
            }
            CacheValue::NaiveDateTime(dt) => {
                Canonical::Str(dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string())
            }
            CacheValue::Date(d) => Canonical::Str(d.format("%Y-%m-%d").to_string()),
            CacheValue::Time(t) => Canonical::Str(t.format("%H:%M:%S%.6f").to_string()),
            CacheValue::Duration(d) => Canonical::Str(d.to_string()),
            CacheValue::Uuid(u) => Canonical::Str(u.hyphenated().to_string()),
            CacheValue::IpAddr(ip) => Canonical::Str(ip.to_string()),
            CacheValue::Path(p) => Canonical::Str(p.to_string_lossy().into_owned()),
            CacheValue::Map(entries) => self.encode_entries(
                entries.iter().map(|(k, v)| (k.as_str(), v)),
                state,
                depth,
            )?,
            CacheValue::List(items) | CacheValue::Tuple(items) => {
                self.encode_sequence(items, state, depth)?
            }
            CacheValue::Set(items) | CacheValue::FrozenSet(items) => {
                self.encode_set(items, state, depth)?
            }
            CacheValue::Entity(entity) => Canonical::Str(entity.token()),
            CacheValue::Enum(member) => Canonical::Str(member.token()),
            CacheValue::Record(record) => self.encode_entries(
                record
                    .stable_fields()
                    .map(|field| (field.name.as_str(), &field.value)),
                state,
                depth,
            )?,
            CacheValue::Object(object) => {
                self.encode_entries(object.public_attributes(), state, depth)?
            }
            CacheValue::Request(params) => self.encode_entries(params.iter(), state, depth)?,
            CacheValue::Custom(custom) => self.encode_custom(custom.as_ref(), state, depth)?,
            CacheValue::Shared(shared) => self.encode_shared(shared, state, depth)?,
        };
        Ok(encoded)
    }

    fn excluded_in(&self, value: &CacheValue, state: &EncodeState) -> bool {
        // A shared value already on the stack is a cycle; leave it to
        // encode_shared instead of locking it a second time.
        if let CacheValue::Shared(shared) = value {
            if state.active.contains(&shared.id()) {
                return false;
            }
        }
        let excluded = self.is_excluded(value);
        if excluded {
            trace!(type_name = %value.type_name(), "dropping excluded value");
        }
        excluded
    }

    fn encode_entries<'v>(
        &self,
        entries: impl Iterator<Item = (&'v str, &'v CacheValue)>,
        state: &mut EncodeState,
        depth: usize,
    ) -> Result<Canonical, EncodeError> {
        let mut sorted = BTreeMap::new();
        for (key, value) in entries {
            if self.excluded_in(value, state) {
                continue;
            }
            let encoded = self.encode_value(value, state, depth + 1)?;
            sorted.insert(key.to_string(), encoded);
        }
        Ok(Canonical::Object(sorted))
    }

    fn encode_sequence(
        &self,
        items: &[CacheValue],
        state: &mut EncodeState,
        depth: usize,
    ) -> Result<Canonical, EncodeError> {
        let mut encoded = Vec::with_capacity(items.len());
        for item in items {
            if self.excluded_in(item, state) {
                continue;
            }
            encoded.push(self.encode_value(item, state, depth + 1)?);
        }
        Ok(Canonical::Array(encoded))
    }

    fn encode_set(
        &self,
        items: &[CacheValue],
        state: &mut EncodeState,
        depth: usize,
    ) -> Result<Canonical, EncodeError> {
        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            if self.excluded_in(item, state) {
                continue;
            }
            let encoded = self.encode_value(item, state, depth + 1)?;
            keyed.push(((item.type_name(), string_form(&encoded)), encoded));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.dedup();
        Ok(Canonical::Array(keyed.into_iter().map(|(_, v)| v).collect()))
    }

    fn encode_custom(
        &self,
        custom: &dyn CustomArgument,
        state: &mut EncodeState,
        depth: usize,
    ) -> Result<Canonical, EncodeError> {
        if let Some(attributes) = custom.attributes() {
            return self.encode_entries(
                attributes
                    .iter()
                    .filter(|(name, _)| !name.starts_with('_'))
                    .map(|(name, value)| (name.as_str(), value)),
                state,
                depth,
            );
        }
        let repr = custom.stable_repr().map_err(|e| EncodeError::Custom {
            type_name: custom.type_name().to_string(),
            reason: e.to_string(),
        })?;
        if MEMORY_ADDRESS.is_match(&repr) {
            warn!(
                type_name = custom.type_name(),
                repr = %repr,
                "string form looks like it embeds a memory address; cache keys will not be stable"
            );
        }
        Ok(Canonical::Str(repr))
    }

    fn encode_shared(
        &self,
        shared: &SharedValue,
        state: &mut EncodeState,
        depth: usize,
    ) -> Result<Canonical, EncodeError> {
        let id = shared.id();
        if !state.active.insert(id) {
            return Err(EncodeError::CircularReference);
        }
        let result = match shared.read() {
            Some(inner) => self.encode_value(&inner, state, depth + 1),
            None => Err(EncodeError::Poisoned),
        };
        state.active.remove(&id);
        result
    }
}

fn encode_float(f: f64) -> Canonical {
    match Number::from_f64(f) {
        Some(n) => Canonical::Number(n),
        None if f.is_nan() => Canonical::NonFinite("NaN"),
        None if f > 0.0 => Canonical::NonFinite("Infinity"),
        None => Canonical::NonFinite("-Infinity"),
    }
}

/// String form used for ordering set elements: strings as-is, everything
/// else as compact JSON.
fn string_form(value: &Canonical) -> String {
    match value {
        Canonical::Str(s) => s.clone(),
        other => to_compact(other),
    }
}

/// Compact JSON (`,` and `:` separators, no whitespace).
pub(crate) fn to_compact(value: &Canonical) -> String {
    let mut out = String::new();
    value.write_compact(&mut out);
    out
}

/// Two-space indented JSON for human-readable records.
pub(crate) fn to_pretty(value: &Canonical) -> String {
    let mut out = String::new();
    value.write_pretty(&mut out, 0);
    out
}
