use anyhow::Result;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use csmar_downloader::api::{CsmarApi, CsmarClient};
use csmar_downloader::explorer::{probe_databases, render_databases, COMMON_DATABASES};
use csmar_downloader::models::Config;

fn print_access_guidance(username: &str) {
    println!("\n{}", "=".repeat(70));
    println!("POSSIBLE CAUSES & SOLUTIONS");
    println!("{}", "=".repeat(70));
    println!("\n1. STUDENT/INSTITUTIONAL ACCOUNT");
    println!("   - Student accounts often have web-only access");
    println!("   - Check with your institution's CSMAR administrator whether API access is included");
    println!("\n2. API ACCESS NOT ENABLED");
    println!("   - Login to https://www.gtarsc.com/");
    println!("   - Go to Account Settings → API Access → Enable");
    println!("\n3. SUBSCRIPTION TYPE");
    println!("   - Your subscription might not include API access");
    println!("\n4. WEB INTERFACE ALTERNATIVE");
    println!("   - Login to https://data.csmar.com/ and download the CSV files manually");
    println!("\n📧 CSMAR Support: service@gtadata.com");
    println!("   Include your account email ({}) and institution name", username);
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("csmar_downloader=info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!("🔍 CSMAR account check");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration Error: {}", e);
            eprintln!("Set CSMAR_USERNAME and CSMAR_PASSWORD in the environment or a .env file.");
            std::process::exit(1);
        }
    };
    println!("🌐 API: {}", config.api_url);
    println!("👤 Account: {}", config.credentials.username);

    let client = CsmarClient::new(&config)?;

    println!("\n🔑 Step 1: Login...");
    if let Err(e) = client.login(&config.credentials, config.language).await {
        eprintln!("❌ Login failed: {}", e);
        print_access_guidance(&config.credentials.username);
        std::process::exit(1);
    }
    println!("✅ Login successful");

    println!("\n📚 Step 2: Listing databases...");
    match client.list_databases().await {
        Ok(databases) if !databases.is_empty() => {
            println!("✅ {} databases visible", databases.len());
            print!("{}", render_databases(&databases));
        }
        Ok(_) => println!("⚠️  No databases returned"),
        Err(e) => println!("❌ Could not list databases: {}", e),
    }

    println!("\n📋 Step 3: Checking common stock-market databases...");
    let probes = probe_databases(&client, &COMMON_DATABASES).await;
    let accessible = probes.iter().filter(|p| p.accessible()).count();

    if accessible == 0 {
        println!("\n⚠️  No table access in any common database ('No permission to access').");
        print_access_guidance(&config.credentials.username);
    } else {
        println!("\n🎉 Table access confirmed in {} of {} databases", accessible, probes.len());
        println!("💡 Next: csmar-download --validate-only");
    }

    Ok(())
}
