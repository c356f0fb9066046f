use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use csmar_downloader::api::{CsmarApi, CsmarClient};
use csmar_downloader::catalog::Catalog;
use csmar_downloader::data_collector::DataCollector;
use csmar_downloader::export::{save_data, save_merged, timestamp_now};
use csmar_downloader::merge::merge_classifications;
use csmar_downloader::models::Config;

/// Bulk CSMAR downloader
#[derive(Parser)]
#[command(name = "csmar-download")]
#[command(version)]
#[command(about = "Download CSMAR tables to CSV, splitting date ranges to stay under the row limit")]
#[command(long_about = "
Logs in to CSMAR, validates the requested columns of every table in the
catalog, then downloads each table over the configured date range. Tables
with more rows than the per-query limit are fetched in yearly, monthly or
daily chunks. Results are written as one CSV per table plus a JSON manifest.

Credentials and the date range come from the environment (or a .env file):
  CSMAR_USERNAME, CSMAR_PASSWORD, CSMAR_START_DATE, CSMAR_END_DATE

Examples:
  csmar-download --validate-only                      # check table access only
  csmar-download --skip-confirm -o data/csmar          # full listed-firms download
  csmar-download --catalog classifications --merge     # classifications + merged file
  csmar-download --catalog my_tables.json              # custom catalog
")]
struct Args {
    /// Built-in catalog (listed-firms, classifications) or a JSON catalog file
    #[arg(long, short = 'c', default_value = "listed-firms")]
    catalog: String,

    /// Override CSMAR_OUTPUT_DIR
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Do not ask for confirmation before downloading
    #[arg(long, short = 'y')]
    skip_confirm: bool,

    /// Only validate table and column access
    #[arg(long)]
    validate_only: bool,

    /// Also write one merged file joined on stock code (classification catalogs)
    #[arg(long)]
    merge: bool,
}

/// Prompt user for yes/no input
fn prompt_user(message: &str) -> Result<bool> {
    use std::io::{self, Write};

    print!("{}", message);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().to_lowercase().starts_with('y'))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("csmar_downloader=info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration Error: {}", e);
            eprintln!("Make sure you have a .env file with CSMAR_USERNAME and CSMAR_PASSWORD.");
            std::process::exit(1);
        }
    };
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }

    let catalog = Catalog::resolve(&args.catalog)?;

    println!("{}", "=".repeat(80));
    println!("📊 CSMAR DOWNLOAD: {}", catalog.name);
    println!("{}", "=".repeat(80));
    println!("📅 Time Period: {}", config.date_range);
    println!("📋 Tables: {} in {} categories", catalog.total_tables(), catalog.categories.len());
    println!("📁 Output Directory: {}", config.output_dir.display());
    println!("🔢 Row limit per query: {}", config.max_rows);
    println!("{}", "=".repeat(80));

    if !args.skip_confirm && !args.validate_only {
        println!("\n⚠️  A complete download can take hours and several GB of disk space.");
        if !prompt_user("Continue? (y/N): ")? {
            println!("Download cancelled.");
            return Ok(());
        }
    }

    let client = CsmarClient::new(&config)?;
    println!("\n🔑 Logging in as {}...", config.credentials.username);
    if let Err(e) = client.login(&config.credentials, config.language).await {
        eprintln!("❌ Login failed: {}", e);
        eprintln!("💡 Run csmar-check to diagnose account and API access.");
        std::process::exit(1);
    }
    println!("✅ Login successful");

    let mut collector = DataCollector::from_config(client, &config);

    let report = collector.validate_tables(&catalog).await;
    report.print_summary();

    if args.validate_only {
        println!("Validation only run complete.");
        return Ok(());
    }

    if !report.all_ok()
        && !args.skip_confirm
        && !prompt_user(
            "⚠️  Some tables are missing columns or returned errors. Continue with the rest? (y/N): ",
        )?
    {
        println!("Download cancelled.");
        return Ok(());
    }

    let downloaded = collector.download_all(&catalog).await;
    let stats = collector.stats().clone();

    if downloaded.is_empty() {
        stats.print_summary();
        eprintln!("\n❌ No data downloaded!");
        eprintln!("This could mean:");
        eprintln!("  1. Table names in the catalog don't match your CSMAR subscription");
        eprintln!("  2. You don't have access to these tables");
        eprintln!("  3. A network issue occurred");
        eprintln!("💡 Run csmar-explore --search <keyword> to find the available tables.");
        std::process::exit(1);
    }

    let timestamp = timestamp_now();
    let (manifest, manifest_path) =
        save_data(&config.output_dir, &downloaded, config.date_range, &timestamp)?;

    if args.merge {
        let datasets: Vec<_> = downloaded
            .iter()
            .map(|table| (table.key.clone(), table.rows.clone()))
            .collect();
        let merged = merge_classifications(&datasets);
        if merged.is_empty() {
            println!("⚠️  Nothing to merge");
        } else {
            save_merged(&config.output_dir, &merged, &timestamp)?;
        }
    }

    stats.print_summary();
    println!(
        "\n🎉 Saved {} tables ({} records, {:.2} MB)",
        manifest.total_tables, manifest.total_records, manifest.total_size_mb
    );
    println!("📋 Manifest: {}", manifest_path.display());

    if stats.unsplittable > 0 {
        eprintln!(
            "🚫 {} tables exceeded the row limit within a single day and were not downloaded",
            stats.unsplittable
        );
        std::process::exit(2);
    }

    Ok(())
}
