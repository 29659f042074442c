use crate::error::UploadError;
use crate::models::DataRecord;
use crate::store::RecordStore;
use anyhow::Context;
use tracing::{debug, instrument};

/// Stored records in insertion order.
///
/// A missing or empty `type_filter` returns every record; otherwise only
/// records tagged exactly with it (possibly none).
#[instrument(skip(store))]
pub async fn query_records(
    store: &dyn RecordStore,
    type_filter: Option<&str>,
) -> Result<Vec<DataRecord>, UploadError> {
    let type_filter = type_filter.filter(|t| !t.is_empty());

    let records = store
        .list_records(type_filter)
        .await
        .context("Failed to list data records")?;

    debug!(count = records.len(), "Records queried");
    Ok(records)
}
