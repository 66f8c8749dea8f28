//! Error types for the etl-guard transformer library.
//!
//! Errors fall into three groups:
//!
//! - **Configuration errors** are raised while a transformer is being
//!   constructed (invalid weights, unknown aggregation function, missing
//!   backend). Nothing has been processed when one of these is returned.
//! - **Transform errors** are raised by a `transform_batch` call. Every
//!   failure inside a batch call is wrapped into [`EtlError::Transform`].
//! - **Record errors** describe a single record that could not be scored or
//!   classified. They never escape on their own; the transformer that hit
//!   them wraps them into a transform error for the whole batch.

use thiserror::Error;

/// The main error type for the etl-guard library.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Invalid transformer configuration, detected at construction.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A capability the configuration requires is not available.
    #[error("Capability '{capability}' unavailable: {message}")]
    CapabilityUnavailable {
        /// Name of the missing capability (e.g. "embedding_model")
        capability: String,
        /// Detailed error message
        message: String,
    },

    /// Error raised while transforming a batch.
    #[error("Error in {transformer}: {message}")]
    Transform {
        /// Name of the transformer that failed
        transformer: String,
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A single record could not be processed.
    #[error("Record {}: {message}", record_id.as_deref().unwrap_or("<unidentified>"))]
    Record {
        /// Identifier of the offending record, when the source assigned one
        record_id: Option<String>,
        /// Detailed error message
        message: String,
    },

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid regular expression in a configuration.
    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, EtlError>`.
pub type Result<T> = std::result::Result<T, EtlError>;

impl EtlError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a capability-unavailable error.
    pub fn capability_unavailable(
        capability: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::CapabilityUnavailable {
            capability: capability.into(),
            message: message.into(),
        }
    }

    /// Creates a transform error without an underlying source.
    pub fn transform(transformer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transform {
            transformer: transformer.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Wraps any error into a transform error for the named transformer.
    ///
    /// An error that already is a transform error is returned unchanged so
    /// nested transformers do not stack prefixes.
    pub fn wrap_transform(transformer: &str, err: EtlError) -> Self {
        match err {
            already @ EtlError::Transform { .. } => already,
            other => Self::Transform {
                transformer: transformer.to_string(),
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// Creates a per-record error.
    pub fn record(record_id: Option<&str>, message: impl Into<String>) -> Self {
        Self::Record {
            record_id: record_id.map(str::to_string),
            message: message.into(),
        }
    }

    /// Returns `true` for errors raised at construction time.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EtlError::Configuration(_) | EtlError::CapabilityUnavailable { .. } | EtlError::Regex(_)
        )
    }
}

/// Extension trait for adding context to errors.
///
/// The context is prefixed to the message. Configuration, capability and
/// transform errors keep their kind so callers can still branch on
/// [`EtlError::is_configuration`]; everything else becomes
/// [`EtlError::Internal`].
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<EtlError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| e.into().prefixed(msg))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().prefixed(&f()))
    }
}

impl EtlError {
    fn prefixed(self, ctx: &str) -> Self {
        match self {
            EtlError::Configuration(msg) => EtlError::Configuration(format!("{ctx}: {msg}")),
            EtlError::Regex(err) => EtlError::Configuration(format!("{ctx}: {err}")),
            EtlError::CapabilityUnavailable {
                capability,
                message,
            } => EtlError::CapabilityUnavailable {
                capability,
                message: format!("{ctx}: {message}"),
            },
            EtlError::Transform {
                transformer,
                message,
                source,
            } => EtlError::Transform {
                transformer,
                message: format!("{ctx}: {message}"),
                source,
            },
            EtlError::Internal(inner) => EtlError::Internal(format!("{ctx}: {inner}")),
            other => EtlError::Internal(format!("{ctx}: {other}")),
        }
    }
}
