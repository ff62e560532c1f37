use std::fmt;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "max_key_length", "exclude_types[2]")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., the offending value)
    pub details: Option<String>,
    /// Source of the error (e.g., "key_generator", "memory_store")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Which argument of a call could not be canonicalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentRef {
    /// Index into the positional arguments as passed, receiver included.
    Positional(usize),
    Keyword(String),
    /// A query parameter folded in from a request-like argument.
    QueryParameter(String),
}

impl fmt::Display for ArgumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentRef::Positional(index) => write!(f, "argument #{}", index),
            ArgumentRef::Keyword(name) => write!(f, "keyword argument '{}'", name),
            ArgumentRef::QueryParameter(name) => write!(f, "request parameter '{}'", name),
        }
    }
}

/// Unified error type for key generation and the caching layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Uncachable {argument} of type '{type_name}' for function '{function}': {reason}")]
    UncachableArgument {
        argument: ArgumentRef,
        type_name: String,
        function: String,
        reason: String,
    },

    #[error("Cache key validation error: {message}{}", format_context(.context))]
    KeyValidation {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Cache store error: {message}{}", format_context(.context))]
    Store {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn uncachable(
        argument: ArgumentRef,
        type_name: impl Into<String>,
        function: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::UncachableArgument {
            argument,
            type_name: type_name.into(),
            function: function.into(),
            reason: reason.into(),
        }
    }

    /// Create a new key validation error with structured context
    pub fn key_validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::KeyValidation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new store error with structured context
    pub fn store_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Store {
            message: msg.into(),
            context,
        }
    }

    /// True for failures caused by the call's arguments rather than by
    /// configuration or the store.
    pub fn is_uncachable(&self) -> bool {
        matches!(self, Error::UncachableArgument { .. })
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::KeyValidation { context, .. }
            | Error::Configuration { context, .. }
            | Error::Store { context, .. } => Some(context),
            _ => None,
        }
    }
}
