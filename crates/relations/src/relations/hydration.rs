//! Hydration - turning fetched rows into records ready for distribution

use std::sync::Arc;

use super::eager_loading::EagerLoader;
use super::pivot::{split_pivot_row, PivotRecord};
use super::traits::LoadOptions;
use crate::backends::{QueryExecutor, Row};
use crate::error::RelationResult;
use crate::model::{ModelInfo, ModelRegistry, Record};
use crate::query::Query;

/// Run a SELECT and hydrate every row as a persisted record of `model`
pub(crate) async fn fetch_records(
    conn: &dyn QueryExecutor,
    model: &Arc<ModelInfo>,
    query: &Query,
) -> RelationResult<Vec<Record>> {
    let rows = conn.fetch_all(query).await?;
    Ok(rows
        .into_iter()
        .map(|row| Record::from_row(model.clone(), row))
        .collect())
}

/// Hydrate joined rows, moving prefixed pivot columns into a
/// [`PivotRecord`] on each record
pub(crate) fn hydrate_with_pivot(
    model: &Arc<ModelInfo>,
    rows: Vec<Row>,
    prefix: &str,
    pivot_attribute: &str,
    pivot_table: &str,
) -> Vec<Record> {
    rows.into_iter()
        .map(|row| {
            let (attributes, pivot) = split_pivot_row(row, prefix);
            let mut record = Record::from_row(model.clone(), attributes);
            record.set_pivot(PivotRecord::new(pivot_attribute, pivot_table, pivot));
            record
        })
        .collect()
}

/// Eager load `options.with` on already fetched records, one batch per
/// relation
pub(crate) async fn load_nested(
    conn: &dyn QueryExecutor,
    registry: &Arc<ModelRegistry>,
    records: &mut [Record],
    options: &LoadOptions,
) -> RelationResult<()> {
    if options.with.is_empty() || records.is_empty() {
        return Ok(());
    }
    let mut loader = EagerLoader::new(registry.clone()).with_all(options.with.iter().cloned());
    for (path, filter) in &options.nested_filters {
        loader = loader.with_query_filter(path, filter.clone());
    }
    loader.load(conn, records).await
}

/// Give every related record a snapshot of the owner that loaded it
pub(crate) fn with_owner(records: impl IntoIterator<Item = Record>, owner: &Record) -> Vec<Record> {
    records
        .into_iter()
        .map(|mut record| {
            record.set_owner(owner.snapshot());
            record
        })
        .collect()
}
