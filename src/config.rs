use crate::analysis::DEFAULT_BATCH_SIZE;
use clap::Args;
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

const DEFAULT_LOG_FILTER: &str = "info,sqlx=warn,hyper=warn,reqwest=info";

#[derive(Debug, Clone, Args)]
pub struct DatabaseConfig {
    /// SQLite database shared with the scraper
    #[arg(long, env = "DATABASE_PATH", default_value = "rivalprice.db")]
    pub database_path: String,
}

#[derive(Debug, Clone, Args)]
pub struct LlmConfig {
    /// Enables model summaries; without it the rule table is used
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Maximum number of pending changes analyzed per run
    #[arg(long, env = "ANALYSIS_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: u32,
}

impl LlmConfig {
    /// The configured key, ignoring blank values.
    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Install the global subscriber. The filter comes from `LOG_LEVEL`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL")
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(ErrorLayer::default())
        .init();
}
