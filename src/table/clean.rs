// src/table/clean.rs

use arrow::array::{Array, BooleanArray};
use arrow::compute::{and, filter_record_batch, is_not_null};
use arrow::record_batch::RecordBatch;
use tracing::debug;

use super::Table;
use crate::error::{Error, Result};

/// Mask that is true for rows with no null in any column, or `None`
/// when no column holds a null.
fn complete_rows(batch: &RecordBatch) -> Result<Option<BooleanArray>> {
    let mut mask: Option<BooleanArray> = None;
    for column in batch.columns() {
        if column.logical_null_count() == 0 {
            continue;
        }
        let valid = is_not_null(column.as_ref()).map_err(internal)?;
        mask = Some(match mask {
            Some(acc) => and(&acc, &valid).map_err(internal)?,
            None => valid,
        });
    }
    Ok(mask)
}

/// Drop every row in which any column is null. Row order is kept.
pub fn drop_null_rows(table: &Table) -> Result<Table> {
    let Some(mask) = complete_rows(&table.batch)? else {
        return Ok(table.clone());
    };

    let batch = filter_record_batch(&table.batch, &mask).map_err(internal)?;
    debug!(
        file = %table.filename,
        before = table.num_rows(),
        after = batch.num_rows(),
        "dropped rows with nulls"
    );

    Ok(Table {
        filename: table.filename.clone(),
        format: table.format,
        batch,
    })
}

fn internal(err: arrow::error::ArrowError) -> Error {
    Error::Internal(format!("filtering rows: {err}"))
}
