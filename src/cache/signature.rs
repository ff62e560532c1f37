//! Call descriptions consumed by the key generator.

use crate::value::{CacheValue, ToCacheValue};
use chrono::{DateTime, Utc};
use std::fmt;

/// Stable textual identity of a callable: module path plus qualified name.
///
/// The caller resolves it; methods should use `Type.method` as qualified
/// name so bound and unbound references agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionIdentity {
    module: String,
    qualname: String,
}

impl FunctionIdentity {
    pub fn new(module: impl Into<String>, qualname: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            qualname: qualname.into(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn qualname(&self) -> &str {
        &self.qualname
    }
}

impl fmt::Display for FunctionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_empty() {
            f.write_str(&self.qualname)
        } else {
            write!(f, "{}.{}", self.module, self.qualname)
        }
    }
}

/// Build a [`FunctionIdentity`] for a function or `Type::method` in the
/// calling module.
///
/// ```rust
/// use easy_cache::function_identity;
///
/// let id = function_identity!(ReportService::monthly);
/// assert_eq!(id.qualname(), "ReportService.monthly");
/// ```
#[macro_export]
macro_rules! function_identity {
    ($ty:ident :: $name:ident) => {
        $crate::cache::FunctionIdentity::new(
            ::std::module_path!(),
            ::std::concat!(::std::stringify!($ty), ".", ::std::stringify!($name)),
        )
    };
    ($name:ident) => {
        $crate::cache::FunctionIdentity::new(::std::module_path!(), ::std::stringify!($name))
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallableKind {
    #[default]
    Function,
    /// The first positional argument is the receiver and never takes part
    /// in the key.
    Method,
}

/// One invocation: function identity, arguments and an optional expiration
/// instant.
#[derive(Debug, Clone)]
pub struct CallSignature {
    function: FunctionIdentity,
    kind: CallableKind,
    args: Vec<CacheValue>,
    kwargs: Vec<(String, CacheValue)>,
    expiration: Option<DateTime<Utc>>,
}

impl CallSignature {
    pub fn new(function: FunctionIdentity) -> Self {
        Self {
            function,
            kind: CallableKind::Function,
            args: Vec::new(),
            kwargs: Vec::new(),
            expiration: None,
        }
    }

    pub fn for_function(module: impl Into<String>, qualname: impl Into<String>) -> Self {
        Self::new(FunctionIdentity::new(module, qualname))
    }

    /// A bound method call; pass the receiver as the first [`arg`](Self::arg).
    pub fn for_method(module: impl Into<String>, qualname: impl Into<String>) -> Self {
        Self::new(FunctionIdentity::new(module, qualname)).with_kind(CallableKind::Method)
    }

    pub fn with_kind(mut self, kind: CallableKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn arg(mut self, value: impl ToCacheValue) -> Self {
        self.args.push(value.to_cache_value());
        self
    }

    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToCacheValue,
    {
        self.args
            .extend(values.into_iter().map(|v| v.to_cache_value()));
        self
    }

    /// Set a keyword argument; setting the same name twice keeps the first
    /// position and the last value.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl ToCacheValue) -> Self {
        let name = name.into();
        let value = value.to_cache_value();
        match self.kwargs.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.kwargs.push((name, value)),
        }
        self
    }

    pub fn with_expiration(mut self, at: DateTime<Utc>) -> Self {
        self.expiration = Some(at);
        self
    }

    pub fn function(&self) -> &FunctionIdentity {
        &self.function
    }

    pub fn kind(&self) -> CallableKind {
        self.kind
    }

    /// Positional arguments as passed, receiver included.
    pub fn positional(&self) -> &[CacheValue] {
        &self.args
    }

    pub fn receiver(&self) -> Option<&CacheValue> {
        match self.kind {
            CallableKind::Method => self.args.first(),
            CallableKind::Function => None,
        }
    }

    /// Offset of the first positional argument that takes part in the key.
    pub fn explicit_offset(&self) -> usize {
        match self.kind {
            CallableKind::Method => self.args.len().min(1),
            CallableKind::Function => 0,
        }
    }

    /// Positional arguments without the receiver.
    pub fn explicit_args(&self) -> &[CacheValue] {
        &self.args[self.explicit_offset()..]
    }

    pub fn keywords(&self) -> &[(String, CacheValue)] {
        &self.kwargs
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }
}
