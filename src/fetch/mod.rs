// src/fetch/mod.rs
use anyhow::{Context, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::{fs, task, time::Instant};
use tracing::{error, info, instrument, warn};
use url::Url;

pub mod urls;
pub mod zips;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub base_url: Url,
    pub data_dir: PathBuf,
    /// Leave archives whose folder already holds files alone.
    pub skip_existing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FetchSummary {
    pub listed: usize,
    pub extracted: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    /// `(archive href, error)`
    pub failures: Vec<(String, String)>,
}

async fn has_entries(dir: &Path) -> bool {
    match fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

/// Download `href` (relative to `base`) and extract it into
/// `<data_dir>/<href without .zip>/`. Returns the folder and file count.
pub async fn fetch_and_extract(
    client: &Client,
    base: &Url,
    href: &str,
    data_dir: &Path,
) -> Result<(PathBuf, usize)> {
    let folder = data_dir.join(zips::archive_folder_name(href)?);
    fs::create_dir_all(&folder)
        .await
        .with_context(|| format!("creating {}", folder.display()))?;

    let url = base
        .join(href)
        .with_context(|| format!("resolving {} against {}", href, base))?;
    let bytes = zips::download_archive(client, &url).await?;
    info!(%url, bytes = bytes.len(), "downloaded");

    let dest = folder.clone();
    let files = task::spawn_blocking(move || zips::extract_archive(&bytes, &dest))
        .await
        .context("extraction task panicked")??;
    Ok((folder, files))
}

/// List the archives at `opts.base_url` and fetch them one after another.
///
/// An empty listing is an error. Per-archive failures are logged, recorded in
/// the summary, and do not stop the run.
#[instrument(level = "info", skip(client, opts), fields(base = %opts.base_url))]
pub async fn run_fetch(client: &Client, opts: &FetchOptions) -> Result<FetchSummary> {
    let start = Instant::now();
    fs::create_dir_all(&opts.data_dir)
        .await
        .with_context(|| format!("creating data dir {}", opts.data_dir.display()))?;

    let archives = urls::list_available_archives(client, &opts.base_url).await?;
    let mut summary = FetchSummary {
        listed: archives.len(),
        ..FetchSummary::default()
    };

    for href in &archives {
        if opts.skip_existing {
            if let Ok(name) = zips::archive_folder_name(href) {
                let folder = opts.data_dir.join(name);
                if has_entries(&folder).await {
                    info!(folder = %folder.display(), "already extracted; skipping");
                    summary.skipped.push(folder);
                    continue;
                }
            }
        }

        info!(archive = %href, "downloading and extracting");
        match fetch_and_extract(client, &opts.base_url, href, &opts.data_dir).await {
            Ok((folder, files)) => {
                info!(folder = %folder.display(), files, "extracted");
                summary.extracted.push(folder);
            }
            Err(e) => {
                error!(archive = %href, error = %format!("{:#}", e), "failed to process archive");
                summary.failures.push((href.clone(), format!("{:#}", e)));
            }
        }
    }

    if !summary.failures.is_empty() {
        warn!(failed = summary.failures.len(), "some archives failed");
    }
    info!(
        listed = summary.listed,
        extracted = summary.extracted.len(),
        skipped = summary.skipped.len(),
        elapsed = ?start.elapsed(),
        "fetch complete"
    );
    Ok(summary)
}
