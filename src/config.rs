//! Command-line and environment settings of the three binaries.

use anyhow::{Context, Result};
use clap::{Args, Parser};
use std::path::PathBuf;
use url::Url;

use crate::{
    dataset::DEFAULT_YEAR_PREFIX,
    fetch::{urls::DEFAULT_BASE_URL, FetchOptions},
    query::Classification,
};

pub const DEFAULT_DATA_DIR: &str = "arquivos_csv";

/// Where the extracted yearly folders live.
#[derive(Debug, Clone, Args)]
pub struct DataArgs {
    #[arg(long, env = "FII_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,
    /// Folder prefix in front of the year, e.g. `inf_trimestral_fii_2023`.
    #[arg(long, env = "FII_YEAR_PREFIX", default_value = DEFAULT_YEAR_PREFIX)]
    pub year_prefix: String,
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Download and extract the CVM quarterly FII archives")]
pub struct FetchArgs {
    #[arg(long, env = "FII_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
    #[arg(long, env = "FII_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,
    /// Skip archives whose folder already holds files.
    #[arg(long)]
    pub skip_existing: bool,
}

impl FetchArgs {
    pub fn to_options(&self) -> Result<FetchOptions> {
        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(FetchOptions {
            base_url: Url::parse(&base).with_context(|| format!("invalid base URL {}", self.base_url))?,
            data_dir: self.data_dir.clone(),
            skip_existing: self.skip_existing,
        })
    }
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Serve the FII quarterly filings dashboard")]
pub struct DashboardArgs {
    #[command(flatten)]
    pub data: DataArgs,
    #[arg(long, env = "PORT", default_value_t = 8050)]
    pub port: u16,
    /// YAML file overriding the metric classification tokens.
    #[arg(long, env = "FII_CLASSIFICATION")]
    pub classification: Option<PathBuf>,
}

impl DashboardArgs {
    pub fn classification(&self) -> Result<Classification> {
        match &self.classification {
            Some(path) => Classification::from_yaml_file(path),
            None => Ok(Classification::default()),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Load the FII dataset once and summarize it")]
pub struct InspectArgs {
    #[command(flatten)]
    pub data: DataArgs,
    /// Write the consolidated table to this Parquet file.
    #[arg(long)]
    pub export: Option<PathBuf>,
    /// Write the per-file load report to this JSON file.
    #[arg(long)]
    pub report: Option<PathBuf>,
}
