use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use std::{io::Cursor, path::Path};
use url::Url;
use zip::ZipArchive;

use super::urls::ARCHIVE_SUFFIX;

/// Destination folder for an archive href: its file name without `.zip`.
pub fn archive_folder_name(href: &str) -> Result<String> {
    let file_name = href
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("archive href {:?} has no file name", href))?;
    let stem_len = file_name.len().saturating_sub(ARCHIVE_SUFFIX.len());
    let stem = match file_name.get(stem_len..) {
        Some(suffix) if suffix.eq_ignore_ascii_case(ARCHIVE_SUFFIX) => &file_name[..stem_len],
        _ => file_name,
    };
    if stem.is_empty() || stem == "." || stem == ".." {
        return Err(anyhow!("archive href {:?} gives no usable folder name", href));
    }
    Ok(stem.to_string())
}

/// Download a whole archive into memory.
pub async fn download_archive(client: &Client, url: &Url) -> Result<Vec<u8>> {
    let resp = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()?;
    let bytes = resp
        .bytes()
        .await
        .with_context(|| format!("reading body from {}", url))?;
    Ok(bytes.to_vec())
}

/// Extract every entry of an in-memory archive under `dest`.
/// Returns the number of files written.
///
/// An entry whose path would leave `dest` (absolute, or climbing with `..`)
/// fails the whole archive before anything is written. An I/O error part way
/// through leaves the entries extracted so far in place.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).context("opening ZIP archive")?;
    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .with_context(|| format!("reading ZIP entry {}", i))?;
        if entry.enclosed_name().is_none() {
            bail!("ZIP entry {:?} escapes the destination folder", entry.name());
        }
    }
    let files = archive.file_names().filter(|n| !n.ends_with('/')).count();
    archive
        .extract(dest)
        .with_context(|| format!("extracting into {}", dest.display()))?;
    Ok(files)
}
