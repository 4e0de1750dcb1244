use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, Float64Builder, NullArray, StringArray, StringBuilder, TimestampMillisecondBuilder},
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use std::sync::Arc;

use crate::load::{
    csv_file::RawTable,
    date_parser::parse_timestamp_millis,
    utils::{clean_str, parse_number, DecimalSeparator},
    SOURCE_FOLDER,
};

/// Substring (case-insensitive) that marks a column as holding dates.
pub const DATE_MARKER: &str = "data";

pub fn is_date_column(name: &str) -> bool {
    name.to_lowercase().contains(DATE_MARKER)
}

pub fn date_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

/// Build a typed arrow column from raw cells.
///
/// - date columns (by name) become timestamps; bad cells become null
/// - all non-empty cells numeric => Float64
/// - no non-empty cells => Null
/// - anything else => Utf8
pub fn infer_column<'a, I>(name: &str, cells: I, len: usize, decimal: DecimalSeparator) -> ArrayRef
where
    I: Iterator<Item = &'a str> + Clone,
{
    let cleaned = cells.map(clean_str).map(|s| (!s.is_empty()).then_some(s));

    if is_date_column(name) {
        let mut b = TimestampMillisecondBuilder::with_capacity(len);
        for cell in cleaned {
            b.append_option(cell.and_then(parse_timestamp_millis));
        }
        return Arc::new(b.finish());
    }

    let mut any_present = false;
    let mut all_numeric = true;
    for cell in cleaned.clone().flatten() {
        any_present = true;
        if parse_number(cell, decimal).is_none() {
            all_numeric = false;
            break;
        }
    }

    if !any_present {
        return Arc::new(NullArray::new(len));
    }

    if all_numeric {
        let mut b = Float64Builder::with_capacity(len);
        for cell in cleaned {
            b.append_option(cell.and_then(|c| parse_number(c, decimal)));
        }
        return Arc::new(b.finish());
    }

    let mut b = StringBuilder::with_capacity(len, len * 8);
    for cell in cleaned {
        b.append_option(cell);
    }
    Arc::new(b.finish())
}

/// Type every column of `table` and append the `source_folder` tag.
pub fn to_record_batch(
    table: &RawTable,
    decimal: DecimalSeparator,
    source_folder: &str,
) -> Result<RecordBatch> {
    let len = table.rows.len();
    let mut fields = Vec::with_capacity(table.headers.len() + 1);
    let mut columns = Vec::with_capacity(table.headers.len() + 1);

    for (idx, name) in table.headers.iter().enumerate() {
        // the provenance tag always wins over a same-named column in the file
        if name == SOURCE_FOLDER {
            continue;
        }
        let cells = table.rows.iter().map(move |row| row[idx].as_str());
        let col = infer_column(name, cells, len, decimal);
        fields.push(Field::new(name, col.data_type().clone(), true));
        columns.push(col);
    }

    fields.push(Field::new(SOURCE_FOLDER, DataType::Utf8, true));
    columns.push(Arc::new(StringArray::from(vec![source_folder; len])) as ArrayRef);

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .context("building record batch from CSV rows")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{Float64Type, TimestampMillisecondType};

    fn raw(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn infers_dates_numbers_text_and_nulls() -> Result<()> {
        let table = raw(
            &["Data_Referencia", "Valor_CRI", "Nome_Fundo", "Vazia"],
            &[
                &["2023-03-31", "10,5", "Alpha", ""],
                &["sem data", "", "Beta", " "],
                &["2023-06-30", "2", "3", ""],
            ],
        );
        let batch = to_record_batch(&table, DecimalSeparator::Comma, "inf_trimestral_fii_2023")?;
        let schema = batch.schema();

        assert_eq!(schema.field(0).data_type(), &date_type());
        assert_eq!(schema.field(1).data_type(), &DataType::Float64);
        assert_eq!(schema.field(2).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(3).data_type(), &DataType::Null);
        assert_eq!(schema.field(4).name(), SOURCE_FOLDER);

        let dates = batch.column(0).as_primitive::<TimestampMillisecondType>();
        assert!(dates.is_valid(0));
        assert!(dates.is_null(1));

        let values = batch.column(1).as_primitive::<Float64Type>();
        assert_eq!(values.value(0), 10.5);
        assert!(values.is_null(1));
        assert_eq!(values.value(2), 2.0);

        let tags = batch.column(4).as_string::<i32>();
        assert!(tags.iter().all(|t| t == Some("inf_trimestral_fii_2023")));
        Ok(())
    }

    #[test]
    fn decimal_convention_decides_numeric_columns() -> Result<()> {
        let table = raw(&["Valor"], &[&["1.5"], &["2.25"]]);
        let comma = to_record_batch(&table, DecimalSeparator::Comma, "x")?;
        assert_eq!(comma.schema().field(0).data_type(), &DataType::Utf8);

        let dot = to_record_batch(&table, DecimalSeparator::Dot, "x")?;
        assert_eq!(dot.schema().field(0).data_type(), &DataType::Float64);
        Ok(())
    }

    #[test]
    fn file_column_named_like_the_tag_is_replaced() -> Result<()> {
        let table = raw(&["source_folder", "Valor"], &[&["bogus", "1"]]);
        let batch = to_record_batch(&table, DecimalSeparator::Dot, "real")?;
        assert_eq!(batch.num_columns(), 2);
        let tags = batch
            .column_by_name(SOURCE_FOLDER)
            .unwrap()
            .as_string::<i32>();
        assert_eq!(tags.value(0), "real");
        Ok(())
    }
}
