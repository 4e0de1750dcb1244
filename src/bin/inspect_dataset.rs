use anyhow::Result;
use clap::Parser;
use fiiscraper::{config::InspectArgs, dataset::export::write_parquet, dataset::Dataset};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env).init();

    let args = InspectArgs::parse();
    let ds = Dataset::open(&args.data.data_dir, &args.data.year_prefix)?;

    println!("records:       {}", ds.num_rows());
    println!("columns:       {}", ds.batch().num_columns());
    println!("date columns:  {:?}", ds.date_columns());
    println!("fund column:   {:?}", ds.fund_column());
    println!("funds:         {}", ds.fund_ids()?.len());
    println!("years:         {:?}", ds.years());
    println!("categorical:   {:?}", ds.categorical_columns());

    let report = ds.report();
    println!("files parsed:  {}", report.parsed().count());
    for f in &report.files {
        match (f.strategy, &f.error) {
            (Some(strategy), _) => println!("  ok   {:>8} rows  [{}]  {}", f.rows, strategy, f.path.display()),
            (None, Some(err)) => println!("  skip {}: {}", f.path.display(), err),
            (None, None) => println!("  skip {}", f.path.display()),
        }
    }

    if let Some(path) = &args.report {
        report.write_json(path)?;
    }

    if let Some(path) = &args.export {
        write_parquet(ds.batch(), path)?;
        info!(path = %path.display(), "exported");
    }
    Ok(())
}
