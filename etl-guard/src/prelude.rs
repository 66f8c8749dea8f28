//! Prelude for commonly used types and traits in etl-guard.

pub use crate::error::{ErrorContext, EtlError, Result};
pub use crate::logging::LogConfig;
pub use crate::record::{Field, FieldType, FieldValue, Record, RecordMetadata, Schema};
pub use crate::transformers::{apply_transformers, StatsReport, Transformer, TransformerConfig};
