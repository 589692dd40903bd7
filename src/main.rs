mod agent;
mod config;
mod history;
mod provider;
mod telegram;
mod tools;

use config::Config;
use history::History;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load config
    let config = Config::from_env();

    tracing::info!("gitscribe v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Model: {}, history dir: {}, allowed users: {:?}",
        config.llm_model,
        config.history_dir,
        config.allowed_users
    );

    // Clone-or-open the transcript repository; the bot cannot run without it
    let history = match History::open(&config.git_repo_url, &config.git_token, &config.history_dir)
    {
        Ok(history) => history,
        Err(err) => {
            tracing::error!("Failed to open transcript repository: {err}");
            std::process::exit(1);
        }
    };

    // Start bot
    telegram::run_bot(config, history).await;
}
