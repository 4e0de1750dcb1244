use anyhow::Result;
use clap::Parser;
use fiiscraper::{
    config::DashboardArgs,
    dashboard::{routes, AppState},
    dataset::Dataset,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env).init();

    let args = DashboardArgs::parse();
    let classification = args.classification()?;
    info!(?classification, "metric classification");

    let data = args.data.clone();
    let dataset = tokio::task::spawn_blocking(move || Dataset::open(&data.data_dir, &data.year_prefix))
        .await??;
    info!(
        records = dataset.num_rows(),
        date_columns = ?dataset.date_columns(),
        fund_column = ?dataset.fund_column(),
        years = ?dataset.years(),
        "dataset loaded"
    );

    let state = Arc::new(AppState {
        dataset,
        classification,
    });

    info!("Server starting on port {}", args.port);
    info!("Dashboard: http://localhost:{}/", args.port);
    warp::serve(routes(state)).run(([0, 0, 0, 0], args.port)).await;

    Ok(())
}
