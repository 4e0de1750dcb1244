// src/load/mod.rs
use anyhow::{anyhow, Context, Result};
use arrow::record_batch::RecordBatch;
use glob::{glob_with, MatchOptions, Pattern};
use serde::Serialize;
use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{info, instrument, warn};

pub mod categorize;
pub mod concat;
pub mod csv_file;
pub mod date_parser;
pub mod infer;
pub mod utils;

/// Name of the provenance column added to every loaded row.
pub const SOURCE_FOLDER: &str = "source_folder";

/// What happened to one CSV file during loading.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub source_folder: String,
    pub rows: usize,
    /// `None` when the file was skipped.
    pub strategy: Option<&'static str>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub files: Vec<FileOutcome>,
    pub elapsed_ms: u128,
}

impl LoadReport {
    pub fn parsed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| f.strategy.is_some())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| f.strategy.is_none())
    }

    pub fn total_rows(&self) -> usize {
        self.parsed().map(|f| f.rows).sum()
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("creating report file {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("writing load report to {}", path.display()))?;
        info!(path = %path.display(), files = self.files.len(), "wrote load report");
        Ok(())
    }
}

pub struct Loaded {
    pub batch: RecordBatch,
    pub report: LoadReport,
}

/// Every `*.csv` (any case) below `root`, sorted.
pub fn find_csv_files(root: &Path) -> Result<Vec<PathBuf>> {
    let root_str = root
        .to_str()
        .ok_or_else(|| anyhow!("data directory {:?} is not valid UTF-8", root))?;
    let pattern = format!("{}/**/*.csv", Pattern::escape(root_str));
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    let mut files: Vec<PathBuf> = glob_with(&pattern, options)
        .with_context(|| format!("bad glob pattern {}", pattern))?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "unreadable path while scanning");
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Name of the folder directly containing `path`.
fn parent_folder_name(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Load and union every CSV under `root`.
///
/// Files that fail both parse strategies are skipped and recorded in the
/// report. Nothing found yields an empty table.
#[instrument(level = "info", skip(root), fields(root = %root.as_ref().display()))]
pub fn load_all<P: AsRef<Path>>(root: P) -> Result<Loaded> {
    let start = Instant::now();
    let root = root.as_ref();
    if !root.is_dir() {
        warn!("data directory does not exist");
    }

    let files = find_csv_files(root)?;
    info!(count = files.len(), "found CSV files");

    let mut batches = Vec::with_capacity(files.len());
    let mut report = LoadReport::default();

    for path in files {
        let source_folder = parent_folder_name(&path);
        let parsed = csv_file::parse_file(&path).and_then(|(table, strategy)| {
            infer::to_record_batch(&table, strategy.decimal, &source_folder)
                .map(|batch| (batch, strategy))
        });

        match parsed {
            Ok((batch, strategy)) => {
                report.files.push(FileOutcome {
                    path,
                    source_folder,
                    rows: batch.num_rows(),
                    strategy: Some(strategy.name),
                    error: None,
                });
                batches.push(batch);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %format!("{:#}", e), "skipping file");
                report.files.push(FileOutcome {
                    path,
                    source_folder,
                    rows: 0,
                    strategy: None,
                    error: Some(format!("{:#}", e)),
                });
            }
        }
    }

    let batch = concat::union_batches(&batches)?;
    report.elapsed_ms = start.elapsed().as_millis();

    if batch.num_rows() == 0 {
        warn!("no rows loaded");
    }
    info!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        parsed = report.parsed().count(),
        skipped = report.skipped().count(),
        elapsed_ms = report.elapsed_ms,
        "load complete"
    );

    Ok(Loaded { batch, report })
}
