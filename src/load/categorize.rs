use anyhow::{Context, Result};
use arrow::{
    array::{
        Array, ArrayRef, AsArray, PrimitiveDictionaryBuilder, StringDictionaryBuilder,
    },
    datatypes::{DataType, Field, Float64Type, Int32Type, Schema},
    record_batch::RecordBatch,
};
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, warn};

/// A column is low-cardinality when its distinct count is below
/// `rows / LOW_CARDINALITY_DIVISOR`.
pub const LOW_CARDINALITY_DIVISOR: usize = 10;

/// Distinct non-null values of a text or float column; `None` for other types.
fn distinct_count(array: &dyn Array) -> Option<usize> {
    match array.data_type() {
        DataType::Utf8 => Some(
            array
                .as_string::<i32>()
                .iter()
                .flatten()
                .collect::<HashSet<_>>()
                .len(),
        ),
        DataType::Float64 => Some(
            array
                .as_primitive::<Float64Type>()
                .iter()
                .flatten()
                .map(f64::to_bits)
                .collect::<HashSet<_>>()
                .len(),
        ),
        _ => None,
    }
}

/// Dictionary-encode a text or float column. `None` when the type is not
/// supported or the column is already encoded.
pub fn encode_dictionary(array: &dyn Array) -> Result<Option<ArrayRef>> {
    match array.data_type() {
        DataType::Utf8 => {
            let mut b = StringDictionaryBuilder::<Int32Type>::new();
            for v in array.as_string::<i32>().iter() {
                match v {
                    Some(v) => {
                        b.append(v)?;
                    }
                    None => b.append_null(),
                }
            }
            Ok(Some(Arc::new(b.finish())))
        }
        DataType::Float64 => {
            let mut b = PrimitiveDictionaryBuilder::<Int32Type, Float64Type>::new();
            for v in array.as_primitive::<Float64Type>().iter() {
                match v {
                    Some(v) => {
                        b.append(v)?;
                    }
                    None => b.append_null(),
                }
            }
            Ok(Some(Arc::new(b.finish())))
        }
        _ => Ok(None),
    }
}

fn replace_columns(batch: &RecordBatch, replaced: Vec<(usize, ArrayRef)>) -> Result<RecordBatch> {
    let mut columns = batch.columns().to_vec();
    let mut fields: Vec<Field> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    for (idx, col) in replaced {
        fields[idx] = fields[idx].clone().with_data_type(col.data_type().clone());
        columns[idx] = col;
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .context("rebuilding batch with categorical columns")
}

/// Re-encode every low-cardinality column as a dictionary.
/// Returns the new batch and the names of the converted columns.
pub fn categorize_low_cardinality(batch: &RecordBatch) -> Result<(RecordBatch, Vec<String>)> {
    let rows = batch.num_rows();
    if rows == 0 {
        return Ok((batch.clone(), Vec::new()));
    }

    let schema = batch.schema();
    let mut replaced = Vec::new();
    let mut names = Vec::new();
    for (idx, field) in schema.fields().iter().enumerate() {
        let col = batch.column(idx);
        let Some(distinct) = distinct_count(col.as_ref()) else {
            continue;
        };
        if distinct * LOW_CARDINALITY_DIVISOR >= rows {
            continue;
        }
        match encode_dictionary(col.as_ref()) {
            Ok(Some(encoded)) => {
                debug!(column = %field.name(), distinct, rows, "categorized");
                replaced.push((idx, encoded));
                names.push(field.name().clone());
            }
            Ok(None) => {}
            Err(e) => warn!(column = %field.name(), error = %e, "could not categorize column"),
        }
    }

    Ok((replace_columns(batch, replaced)?, names))
}

/// Dictionary-encode one named column regardless of its cardinality.
/// Already-encoded or unsupported columns are left untouched.
pub fn force_categorize(batch: &RecordBatch, column: &str) -> Result<RecordBatch> {
    let Ok(idx) = batch.schema().index_of(column) else {
        return Ok(batch.clone());
    };
    match encode_dictionary(batch.column(idx).as_ref())? {
        Some(encoded) => replace_columns(batch, vec![(idx, encoded)]),
        None => {
            if !matches!(batch.column(idx).data_type(), DataType::Dictionary(_, _)) {
                warn!(column, data_type = ?batch.column(idx).data_type(), "column type cannot be categorized");
            }
            Ok(batch.clone())
        }
    }
}
