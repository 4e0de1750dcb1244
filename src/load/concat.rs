use anyhow::{Context, Result};
use arrow::{
    array::{new_null_array, ArrayRef},
    compute::{cast, concat_batches},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

/// Resolve the type of a column seen with two different types in two files.
fn merge_types(a: &DataType, b: &DataType) -> DataType {
    match (a, b) {
        (a, b) if a == b => a.clone(),
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        _ => DataType::Utf8,
    }
}

/// Build the schema covering every column of every batch, in first-seen order.
pub fn union_schema(batches: &[RecordBatch]) -> SchemaRef {
    let mut order: Vec<String> = Vec::new();
    let mut types: HashMap<String, DataType> = HashMap::new();

    for batch in batches {
        for field in batch.schema().fields() {
            match types.get(field.name()) {
                None => {
                    order.push(field.name().clone());
                    types.insert(field.name().clone(), field.data_type().clone());
                }
                Some(existing) => {
                    let merged = merge_types(existing, field.data_type());
                    if &merged != existing {
                        debug!(column = %field.name(), from = ?existing, to = ?merged, "widening column type");
                    }
                    types.insert(field.name().clone(), merged);
                }
            }
        }
    }

    let fields: Vec<Field> = order
        .iter()
        .map(|name| {
            let ty = match &types[name] {
                // never populated anywhere: keep as text so it stays filterable
                DataType::Null => DataType::Utf8,
                other => other.clone(),
            };
            Field::new(name, ty, true)
        })
        .collect();
    Arc::new(Schema::new(fields))
}

/// Reshape `batch` to `schema`: missing columns are null, others are cast.
fn conform(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch> {
    let rows = batch.num_rows();
    let columns = schema
        .fields()
        .iter()
        .map(|field| -> Result<ArrayRef> {
            match batch.column_by_name(field.name()) {
                Some(col) if col.data_type() == field.data_type() => Ok(col.clone()),
                Some(col) if col.data_type() == &DataType::Null => {
                    Ok(new_null_array(field.data_type(), rows))
                }
                Some(col) => cast(col, field.data_type())
                    .with_context(|| format!("casting column `{}`", field.name())),
                None => Ok(new_null_array(field.data_type(), rows)),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    RecordBatch::try_new(schema.clone(), columns).context("conforming batch to union schema")
}

/// Concatenate per-file batches whose column sets differ.
/// Zero batches give an empty table with no columns.
pub fn union_batches(batches: &[RecordBatch]) -> Result<RecordBatch> {
    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
    }

    let schema = union_schema(batches);
    let conformed = batches
        .iter()
        .map(|b| conform(b, &schema))
        .collect::<Result<Vec<_>>>()?;

    concat_batches(&schema, &conformed).context("concatenating file batches")
}
