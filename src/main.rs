use clap::Parser;
use rivalprice_detector::config::{self, DatabaseConfig};
use rivalprice_detector::sqlite::SqliteData;
use rivalprice_detector::Detector;
use rivalprice_detector::Table;
use tracing::{error, info};

/// Compare the latest snapshots of every monitored page and record changes.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    db: DatabaseConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    config::init_tracing();
    let cli = Cli::parse();

    let data = SqliteData::open(&cli.db.database_path).await?;
    let detector = Detector::new(data);

    let detected = match detector.run_for_all_pages().await {
        Ok(n) => n,
        Err(e) => {
            error!("Could not list pages: {}", e);
            0
        }
    };
    println!("Detected {} changes", detected);
    match detector.store().changes.count().await {
        Ok(total) => info!("{} changes stored", total),
        Err(e) => error!("Could not count changes: {}", e),
    }

    detector.store().close().await;
    Ok(())
}
