//! Row-level access to the handful of column encodings the loader produces.

use anyhow::{anyhow, bail, Result};
use arrow::{
    array::{Array, AsArray, BooleanArray, Float64Array, StringArray},
    compute::cast,
    datatypes::{DataType, Float64Type, Int32Type, TimeUnit, TimestampMillisecondType},
    util::display::{ArrayFormatter, FormatOptions},
};
use std::collections::BTreeSet;

fn is_text_dictionary(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Dictionary(k, v) if k.as_ref() == &DataType::Int32 && v.as_ref() == &DataType::Utf8
    )
}

/// Evaluate `pred` over the text form of every row. Null rows never match.
///
/// Dictionary columns evaluate the predicate once per distinct value.
pub fn match_text(array: &dyn Array, mut pred: impl FnMut(&str) -> bool) -> Result<BooleanArray> {
    match array.data_type() {
        DataType::Utf8 => Ok(array
            .as_string::<i32>()
            .iter()
            .map(|v| Some(v.is_some_and(&mut pred)))
            .collect()),
        dt if is_text_dictionary(dt) => {
            let dict = array.as_dictionary::<Int32Type>();
            let hits: Vec<bool> = dict
                .values()
                .as_string::<i32>()
                .iter()
                .map(|v| v.is_some_and(&mut pred))
                .collect();
            Ok(dict
                .keys()
                .iter()
                .map(|k| Some(k.is_some_and(|k| hits[k as usize])))
                .collect())
        }
        _ => {
            let formatter = ArrayFormatter::try_new(array, &FormatOptions::default())?;
            Ok((0..array.len())
                .map(|i| Some(array.is_valid(i) && pred(&formatter.value(i).to_string())))
                .collect())
        }
    }
}

/// Sorted distinct non-null values, rendered as text.
pub fn distinct_text(array: &dyn Array) -> Result<Vec<String>> {
    let mut out = BTreeSet::new();
    match array.data_type() {
        DataType::Utf8 => {
            out.extend(array.as_string::<i32>().iter().flatten().map(str::to_string));
        }
        dt if is_text_dictionary(dt) => {
            let dict = array.as_dictionary::<Int32Type>();
            let values = dict.values().as_string::<i32>();
            for key in dict.keys().iter().flatten() {
                if values.is_valid(key as usize) {
                    out.insert(values.value(key as usize).to_string());
                }
            }
        }
        _ => {
            let formatter = ArrayFormatter::try_new(array, &FormatOptions::default())?;
            for i in 0..array.len() {
                if array.is_valid(i) {
                    out.insert(formatter.value(i).to_string());
                }
            }
        }
    }
    Ok(out.into_iter().collect())
}

/// Per-row text, `None` for nulls.
pub fn text_cells(array: &dyn Array) -> Result<Vec<Option<String>>> {
    let formatter = ArrayFormatter::try_new(array, &FormatOptions::default())?;
    Ok((0..array.len())
        .map(|i| array.is_valid(i).then(|| formatter.value(i).to_string()))
        .collect())
}

/// Decode a metric column into floats.
///
/// Dictionary-encoded numbers are unpacked; dictionary-encoded text must parse
/// as numbers in full. Plain text is rejected.
pub fn numeric_values(array: &dyn Array) -> Result<Vec<Option<f64>>> {
    match array.data_type() {
        DataType::Float64 => Ok(array.as_primitive::<Float64Type>().iter().collect()),
        DataType::Null => Ok(vec![None; array.len()]),
        dt if dt.is_numeric() => {
            let floats = cast(array, &DataType::Float64)?;
            Ok(floats.as_primitive::<Float64Type>().iter().collect())
        }
        DataType::Dictionary(k, v) if k.as_ref() == &DataType::Int32 => {
            let dict = array.as_dictionary::<Int32Type>();
            match v.as_ref() {
                DataType::Float64 => {
                    let typed = dict
                        .downcast_dict::<Float64Array>()
                        .ok_or_else(|| anyhow!("dictionary values are not Float64"))?;
                    Ok(typed.into_iter().collect())
                }
                DataType::Utf8 => {
                    let typed = dict
                        .downcast_dict::<StringArray>()
                        .ok_or_else(|| anyhow!("dictionary values are not Utf8"))?;
                    typed
                        .into_iter()
                        .map(|v| {
                            v.map(|s| {
                                s.trim()
                                    .parse::<f64>()
                                    .map_err(|_| anyhow!("value {:?} is not numeric", s))
                            })
                            .transpose()
                        })
                        .collect()
                }
                other => bail!("cannot sum a categorical column of {}", other),
            }
        }
        other => bail!("cannot sum a column of type {}", other),
    }
}

/// Millisecond timestamps of a date column.
pub fn timestamp_millis(array: &dyn Array) -> Result<Vec<Option<i64>>> {
    match array.data_type() {
        DataType::Timestamp(TimeUnit::Millisecond, _) => Ok(array
            .as_primitive::<TimestampMillisecondType>()
            .iter()
            .collect()),
        other => bail!("column of type {} is not a date column", other),
    }
}
