use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use csmar_downloader::api::{CsmarApi, CsmarClient};
use csmar_downloader::explorer::{
    render_databases, render_fields, render_matches, render_tables, save_table_list, search_tables,
};
use csmar_downloader::models::Config;

/// Browse CSMAR databases, tables and fields
#[derive(Parser)]
#[command(name = "csmar-explore")]
#[command(version)]
#[command(about = "List and search the CSMAR databases, tables and fields visible to your account")]
#[command(long_about = "
Use this tool to find the exact table and column names to put in a catalog.
Names depend on the subscription and on CSMAR_LANGUAGE.

Examples:
  csmar-explore --list-dbs
  csmar-explore --list-tables \"China Stock Market Series\" --save
  csmar-explore --list-fields FS_Combas
  csmar-explore --search dividend
")]
struct Args {
    /// List all databases
    #[arg(long)]
    list_dbs: bool,

    /// List the tables of a database
    #[arg(long, value_name = "DATABASE")]
    list_tables: Option<String>,

    /// List the fields of a table
    #[arg(long, value_name = "TABLE")]
    list_fields: Option<String>,

    /// Search table names and descriptions (case-insensitive)
    #[arg(long, short = 's', value_name = "KEYWORD")]
    search: Option<String>,

    /// Save the --list-tables result to tables_<database>.txt
    #[arg(long)]
    save: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("csmar_downloader=warn")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if !args.list_dbs
        && args.list_tables.is_none()
        && args.list_fields.is_none()
        && args.search.is_none()
    {
        return Err(anyhow!(
            "Nothing to do: pass --list-dbs, --list-tables, --list-fields or --search (see --help)"
        ));
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration Error: {}", e);
            std::process::exit(1);
        }
    };

    let client = CsmarClient::new(&config)?;
    if let Err(e) = client.login(&config.credentials, config.language).await {
        eprintln!("❌ Login failed: {}", e);
        std::process::exit(1);
    }
    println!("✅ Logged in as {}", config.credentials.username);

    if args.list_dbs {
        let databases = client.list_databases().await?;
        println!("\n📚 DATABASES ({})", databases.len());
        print!("{}", render_databases(&databases));
    }

    if let Some(database) = &args.list_tables {
        let tables = client.list_tables(database).await?;
        println!("\n📋 TABLES IN: {} ({})", database, tables.len());
        print!("{}", render_tables(&tables));
        if args.save {
            let path = save_table_list(std::path::Path::new("."), database, &tables)?;
            println!("✅ Table list saved to: {}", path.display());
        }
    }

    if let Some(table) = &args.list_fields {
        let fields = client.list_fields(table).await?;
        println!("\n🔤 FIELDS IN: {} ({})", table, fields.len());
        print!("{}", render_fields(&fields));
    }

    if let Some(keyword) = &args.search {
        println!("\n🔍 SEARCHING FOR: {}", keyword);
        let matches = search_tables(&client, keyword).await?;
        if matches.is_empty() {
            println!("No tables found matching '{}'", keyword);
        } else {
            print!("{}", render_matches(&matches));
        }
    }

    Ok(())
}
