use anyhow::{anyhow, Result};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::collections::HashSet;

use crate::dataset::column::text_cells;

/// Rows of text keyed by column, ready for a table widget.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualitativeTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QualitativeTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Project `id_column` plus `columns`, keep the first of each duplicate row,
/// and drop rows whose `columns` cells are all null. `id_column` counts as one
/// of `columns` when it is listed there.
pub fn qualitative_table(batch: &RecordBatch, id_column: &str, columns: &[String]) -> Result<QualitativeTable> {
    let mut names = Vec::with_capacity(columns.len() + 1);
    names.push(id_column.to_string());
    names.extend(columns.iter().filter(|c| c.as_str() != id_column).cloned());

    let cells = names
        .iter()
        .map(|name| {
            let col = batch
                .column_by_name(name)
                .ok_or_else(|| anyhow!("column `{}` not found", name))?;
            text_cells(col.as_ref())
        })
        .collect::<Result<Vec<_>>>()?;

    let first_checked = if columns.iter().any(|c| c == id_column) { 0 } else { 1 };

    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for i in 0..batch.num_rows() {
        let row: Vec<Option<String>> = cells.iter().map(|c| c[i].clone()).collect();
        let checked = &row[first_checked..];
        if !checked.is_empty() && checked.iter().all(Option::is_none) {
            continue;
        }
        if seen.insert(row.clone()) {
            rows.push(row);
        }
    }

    Ok(QualitativeTable { columns: names, rows })
}
