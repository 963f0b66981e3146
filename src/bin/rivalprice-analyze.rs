use clap::Parser;
use rivalprice_detector::analysis::{Analyzer, OpenAiClient};
use rivalprice_detector::config::{self, DatabaseConfig, LlmConfig};
use rivalprice_detector::sqlite::SqliteData;
use rivalprice_detector::Table;
use tracing::{error, info};

/// Summarize detected changes that have no analysis yet.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    db: DatabaseConfig,
    #[command(flatten)]
    llm: LlmConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    config::init_tracing();
    let cli = Cli::parse();

    let data = SqliteData::open(&cli.db.database_path).await?;

    let llm = cli.llm.api_key().map(|key| {
        info!("Using {} at {}", cli.llm.openai_model, cli.llm.openai_base_url);
        OpenAiClient::new(key, &cli.llm.openai_model, &cli.llm.openai_base_url)
    });
    if llm.is_none() {
        info!("OPENAI_API_KEY not set, using rule-based summaries");
    }

    let analyzer = Analyzer::new(&data, llm);
    let analyzed = match analyzer.run_analysis(cli.llm.batch_size).await {
        Ok(n) => n,
        Err(e) => {
            error!("Could not load pending changes: {}", e);
            0
        }
    };
    println!("Analyzed {} changes", analyzed);
    match data.analyses.count().await {
        Ok(total) => info!("{} analyses stored", total),
        Err(e) => error!("Could not count analyses: {}", e),
    }

    data.close().await;
    Ok(())
}
