//! Running a list of transformers over one batch.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::Transformer;
use crate::error::Result;
use crate::record::{Record, Schema};

/// Records and schema produced by [`apply_transformers`].
#[derive(Debug, Clone, Default)]
pub struct ChainOutput {
    pub records: Vec<Record>,
    /// Schema in effect after the last transformer
    pub schema: Option<Arc<Schema>>,
}

/// Schema in effect for a batch: the first record's, else `source`.
pub fn resolve_schema(records: &[Record], source: Option<Arc<Schema>>) -> Option<Arc<Schema>> {
    records
        .first()
        .and_then(|r| r.schema.clone())
        .or(source)
}

/// Runs `transformers` in order over `records`.
///
/// Every transformer is set up before the first runs and cleaned up after
/// the last, also when a setup or a batch fails. The first error wins; cleanup
/// errors after a transform failure are logged and dropped.
#[instrument(skip_all, fields(batch_size = records.len(), transformers = transformers.len()))]
pub fn apply_transformers(
    records: Vec<Record>,
    source_schema: Option<&Schema>,
    transformers: &mut [Box<dyn Transformer>],
) -> Result<ChainOutput> {
    let run = transformers
        .iter_mut()
        .try_for_each(|t| t.setup())
        .and_then(|()| run_chain(records, source_schema.cloned().map(Arc::new), transformers));

    let mut cleanup_error = None;
    for transformer in transformers.iter_mut() {
        if let Err(e) = transformer.cleanup() {
            warn!(transformer = transformer.name(), error = %e, "Cleanup failed");
            cleanup_error.get_or_insert(e);
        }
    }

    let output = run?;
    match cleanup_error {
        Some(e) => Err(e),
        None => Ok(output),
    }
}

fn run_chain(
    mut records: Vec<Record>,
    mut schema: Option<Arc<Schema>>,
    transformers: &mut [Box<dyn Transformer>],
) -> Result<ChainOutput> {
    for transformer in transformers.iter_mut() {
        let input = records.len();
        records = transformer.transform_batch(records, schema.as_deref())?;
        schema = resolve_schema(&records, schema);
        info!(
            transformer = transformer.name(),
            input,
            output = records.len(),
            "Applied transformer"
        );
    }
    Ok(ChainOutput { records, schema })
}
