use anyhow::Result;
use clap::Parser;
use fiiscraper::{config::FetchArgs, fetch};
use reqwest::Client;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fiiscraper=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configure ────────────────────────────────────────────────
    let args = FetchArgs::parse();
    let opts = args.to_options()?;
    info!(base = %opts.base_url, data_dir = %opts.data_dir.display(), "fetching archive listing");

    // ─── 3) fetch & extract ──────────────────────────────────────────
    let client = Client::new();
    let summary = match fetch::run_fetch(&client, &opts).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %format!("{:#}", e), "fetch run failed");
            std::process::exit(1);
        }
    };

    for (archive, err) in &summary.failures {
        error!(%archive, %err, "not extracted");
    }
    info!(
        extracted = summary.extracted.len(),
        skipped = summary.skipped.len(),
        failed = summary.failures.len(),
        "done"
    );
    Ok(())
}
