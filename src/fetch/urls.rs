// src/fetch/urls.rs
use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

/// CVM directory listing of the quarterly FII reports.
pub const DEFAULT_BASE_URL: &str = "https://dados.cvm.gov.br/dados/FII/DOC/INF_TRIMESTRAL/DADOS/";

pub const ARCHIVE_SUFFIX: &str = ".zip";

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("CSS selector for links should be valid"));

pub fn is_archive_href(href: &str) -> bool {
    href.to_lowercase().ends_with(ARCHIVE_SUFFIX)
}

/// Every anchor `href` ending in `.zip` (any case), in page order.
pub fn parse_archive_links(html: &str) -> Vec<String> {
    Html::parse_document(html)
        .select(&LINK_SELECTOR)
        .filter_map(|e| e.value().attr("href"))
        .filter(|href| is_archive_href(href))
        .map(str::to_string)
        .collect()
}

/// GET the listing page at `base` and return the archive hrefs it links to.
/// An empty listing is an error.
pub async fn list_available_archives(client: &Client, base: &Url) -> Result<Vec<String>> {
    let html = client
        .get(base.clone())
        .send()
        .await
        .with_context(|| format!("GET {}", base))?
        .error_for_status()?
        .text()
        .await
        .with_context(|| format!("reading body from {}", base))?;

    let links = parse_archive_links(&html);
    debug!(?links, "archive links");
    if links.is_empty() {
        bail!("no {} archives listed at {}", ARCHIVE_SUFFIX, base);
    }
    info!(count = links.len(), %base, "listed archives");
    Ok(links)
}
