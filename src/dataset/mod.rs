// src/dataset/mod.rs
use anyhow::{anyhow, Context, Result};
use arrow::{
    compute::filter_record_batch,
    datatypes::Schema,
    record_batch::RecordBatch,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::Path,
    time::Instant,
};
use tracing::{debug, info, instrument, warn};

use crate::load::{self, categorize, infer::is_date_column, LoadReport, SOURCE_FOLDER};

pub mod column;
pub mod export;

/// Folder prefix of the yearly CVM archives, e.g. `inf_trimestral_fii_2023`.
pub const DEFAULT_YEAR_PREFIX: &str = "inf_trimestral_fii_";

/// Name fragments (case-insensitive) that identify the fund column.
const FUND_MARKERS: &[&str] = &["cnpj", "fundo"];

/// Last `_`-separated segment of a folder name, when it is all digits.
static YEAR_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_(\d+)$").expect("year suffix regex should be valid"));

/// First column whose name looks like a fund identifier.
pub fn detect_fund_column(schema: &Schema) -> Option<String> {
    schema
        .fields()
        .iter()
        .map(|f| f.name())
        .find(|name| {
            let lower = name.to_lowercase();
            FUND_MARKERS.iter().any(|m| lower.contains(m))
        })
        .cloned()
}

/// Years taken from `<prefix><YEAR>` folders directly under `root`,
/// sorted and deduplicated. Folders that do not fit are logged and ignored.
pub fn available_years(root: &Path, prefix: &str) -> Result<Vec<i32>> {
    let entries = match fs::read_dir(root) {
        Ok(e) => e,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "cannot list data directory; no years");
            return Ok(Vec::new());
        }
    };

    let mut years = BTreeSet::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("listing {}", root.display()))?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(prefix) {
            continue;
        }
        let year = YEAR_SUFFIX
            .captures(&name)
            .and_then(|c| c[1].parse::<i32>().ok());
        match year {
            Some(year) => {
                years.insert(year);
            }
            None => warn!(folder = %name, "folder does not end in _<YEAR>; ignored for the year filter"),
        }
    }
    Ok(years.into_iter().collect())
}

/// A filter request from the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub date_column: Option<String>,
    pub funds: Vec<String>,
    pub year: Option<String>,
}

impl Selection {
    /// Build from the comma-joined fund key the UI sends.
    pub fn from_fund_key(date_column: Option<String>, fund_key: &str, year: Option<String>) -> Self {
        Self {
            date_column,
            funds: fund_key
                .split(',')
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect(),
            year,
        }
    }
}

/// The consolidated table plus what was learnt while building it.
/// Built once and never mutated; filters return new batches.
#[derive(Debug)]
pub struct Dataset {
    batch: RecordBatch,
    fund_column: Option<String>,
    categorical: Vec<String>,
    years: Vec<i32>,
    report: LoadReport,
}

impl Dataset {
    /// Load every CSV under `root`, normalize, and detect years from folder names.
    #[instrument(level = "info", skip(root), fields(root = %root.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(root: P, year_prefix: &str) -> Result<Self> {
        let start = Instant::now();
        let root = root.as_ref();
        let loaded = load::load_all(root)?;
        let years = available_years(root, year_prefix)?;
        let dataset = Self::from_batch(loaded.batch, loaded.report, years)?;
        info!(
            rows = dataset.num_rows(),
            years = ?dataset.years,
            fund_column = ?dataset.fund_column,
            elapsed = ?start.elapsed(),
            "dataset ready"
        );
        Ok(dataset)
    }

    /// Apply the post-load normalization to an already unioned batch.
    pub fn from_batch(batch: RecordBatch, report: LoadReport, years: Vec<i32>) -> Result<Self> {
        if batch.num_rows() == 0 {
            warn!("dataset is empty after loading");
        }

        let (mut batch, mut categorical) = categorize::categorize_low_cardinality(&batch)?;
        info!(columns = ?categorical, "converted low-cardinality columns to categorical");

        let fund_column = detect_fund_column(&batch.schema());
        if let Some(col) = &fund_column {
            if !categorical.contains(col) {
                batch = categorize::force_categorize(&batch, col)?;
                categorical.push(col.clone());
            }
            info!(column = %col, "fund identifier column");
        } else {
            warn!("no fund identifier column detected");
        }

        Ok(Self {
            batch,
            fund_column,
            categorical,
            years,
            report,
        })
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn fund_column(&self) -> Option<&str> {
        self.fund_column.as_deref()
    }

    pub fn categorical_columns(&self) -> &[String] {
        &self.categorical
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// Columns holding dates, in table order.
    pub fn date_columns(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .filter(|n| is_date_column(n))
            .collect()
    }

    /// Sorted distinct fund identifiers; empty without a fund column.
    pub fn fund_ids(&self) -> Result<Vec<String>> {
        match self.fund_column.as_deref().and_then(|c| self.batch.column_by_name(c)) {
            Some(col) => column::distinct_text(col.as_ref()),
            None => Ok(Vec::new()),
        }
    }

    /// Restrict the table to the selected funds, then to the selected year.
    ///
    /// An empty fund list or a missing year leaves that dimension untouched.
    /// The year matches rows whose `source_folder` ends with it.
    pub fn filter(&self, selection: &Selection) -> Result<RecordBatch> {
        let start = Instant::now();
        let mut batch = self.batch.clone();
        debug!(rows = batch.num_rows(), ?selection, "filter start");

        if !selection.funds.is_empty() {
            match &self.fund_column {
                Some(col) => {
                    let wanted: HashSet<&str> = selection.funds.iter().map(String::as_str).collect();
                    let ids = batch
                        .column_by_name(col)
                        .ok_or_else(|| anyhow!("fund column `{}` missing", col))?;
                    let mask = column::match_text(ids.as_ref(), |v| wanted.contains(v))?;
                    batch = filter_record_batch(&batch, &mask).context("applying fund filter")?;
                    debug!(funds = selection.funds.len(), rows = batch.num_rows(), "after fund filter");
                }
                None => warn!("no fund identifier column; fund filter ignored"),
            }
        }

        if let Some(year) = selection.year.as_deref().filter(|y| !y.is_empty()) {
            match batch.column_by_name(SOURCE_FOLDER) {
                Some(tags) => {
                    let mask = column::match_text(tags.as_ref(), |v| v.ends_with(year))?;
                    batch = filter_record_batch(&batch, &mask).context("applying year filter")?;
                }
                None => batch = batch.slice(0, 0),
            }
            debug!(year, rows = batch.num_rows(), "after year filter");
        }

        info!(rows = batch.num_rows(), elapsed = ?start.elapsed(), "filter done");
        Ok(batch)
    }
}
