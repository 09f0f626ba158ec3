use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use administradores_scraper::export::{self, Table};
use administradores_scraper::scrape;

/// Fetch the public registry of building administrators from the Buenos
/// Aires portal and export it as CSV.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Matricula number to filter the search by
    #[arg(long, default_value = scrape::DEFAULT_MATRICULA)]
    matricula: String,
    /// Output CSV path
    #[arg(long, default_value = "administradores.csv")]
    output: PathBuf,
    /// Portal URL (serves the token page on GET, the search on POST)
    #[arg(long, default_value = scrape::DEFAULT_PORTAL_URL)]
    url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let client = scrape::build_client().context("build http client")?;
    let records = scrape::fetch_administradores(&client, &args.url, &args.matricula)
        .await
        .context("fetch administrator registry")?;

    let table = Table::from_records(&records);
    export::write_csv(&table, &args.output)
        .with_context(|| format!("write {}", args.output.display()))?;

    tracing::info!(
        rows = table.rows.len(),
        columns = table.columns.len(),
        path = %args.output.display(),
        "saved registry export"
    );

    Ok(())
}
