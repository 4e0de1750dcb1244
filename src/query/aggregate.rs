use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{ArrayRef, Float64Array, TimestampMillisecondArray},
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use std::{collections::BTreeMap, sync::Arc, time::Instant};
use tracing::debug;

use crate::dataset::column::{numeric_values, timestamp_millis};

/// Group `batch` by `date_column` and sum `metric_column`.
///
/// One row per distinct non-null date, ascending. Null metric cells are
/// skipped, so a date whose cells are all null sums to 0. Dates with no rows
/// are not emitted.
pub fn aggregate_sum(batch: &RecordBatch, date_column: &str, metric_column: &str) -> Result<RecordBatch> {
    let start = Instant::now();
    let dates = batch
        .column_by_name(date_column)
        .ok_or_else(|| anyhow!("date column `{}` not found", date_column))?;
    let metric = batch
        .column_by_name(metric_column)
        .ok_or_else(|| anyhow!("metric column `{}` not found", metric_column))?;

    let dates = timestamp_millis(dates.as_ref())
        .with_context(|| format!("reading date column `{}`", date_column))?;
    let values = numeric_values(metric.as_ref())
        .with_context(|| format!("metric column `{}` is not numeric", metric_column))?;

    let mut sums: BTreeMap<i64, f64> = BTreeMap::new();
    for (date, value) in dates.into_iter().zip(values) {
        let Some(date) = date else { continue };
        let sum = sums.entry(date).or_insert(0.0);
        if let Some(v) = value {
            *sum += v;
        }
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new(date_column, DataType::Timestamp(TimeUnit::Millisecond, None), false),
        Field::new(metric_column, DataType::Float64, false),
    ]));
    let out = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(TimestampMillisecondArray::from_iter_values(sums.keys().copied())) as ArrayRef,
            Arc::new(Float64Array::from_iter_values(sums.values().copied())),
        ],
    )
    .context("building aggregate batch")?;

    debug!(
        metric = metric_column,
        groups = out.num_rows(),
        elapsed = ?start.elapsed(),
        "aggregated"
    );
    Ok(out)
}
