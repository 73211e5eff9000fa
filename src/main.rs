use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use auction_autobid_bot::{
    monitoring, replay, scheduler,
    types::{AppConfig, ExecutionMode},
};

fn redact_host(url: &str) -> String {
    url.split('@')
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or("?")
        .to_string()
}

#[derive(Parser, Debug)]
#[command(name = "auction-autobid-bot")]
#[command(about = "Rule-driven auto-bidding bot for timed NFT auctions", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.toml")]
    config: String,

    /// Override execution mode (paper/live)
    #[arg(long)]
    mode: Option<ExecutionMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the auto-bidding bot
    Run {},
    /// Replay recorded snapshots through the rule engine
    Replay {
        /// Optional path to replay configuration
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "auction_autobid_bot=debug,bot=debug,info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(target: "bot", "auction-autobid-bot starting");

    let cli = Cli::parse();
    tracing::debug!(target: "bot", config = %cli.config, "loading config");

    let mut settings = AppConfig::from_file(&cli.config)?;
    tracing::info!(
        target: "bot",
        config = %cli.config,
        auctions = settings.auctions.auctions.len(),
        rules = settings.rules.len(),
        ws_url = %settings.api.ws_url,
        postgres_host = redact_host(&settings.postgres.url),
        "config loaded"
    );

    if let Some(mode) = cli.mode {
        settings.execution.mode = mode;
    }

    match cli.command.unwrap_or(Commands::Run {}) {
        Commands::Run {} => {
            monitoring::logger::log_startup(&settings);
            scheduler::run_bot(settings).await?;
        }
        Commands::Replay { config } => {
            let replay_config_path = config.unwrap_or_else(|| "config/replay.toml".to_string());
            let replay_cfg = replay::config::ReplayConfig::from_file(&replay_config_path)?;
            replay::runner::run_replay(replay_cfg).await?;
        }
    }

    Ok(())
}
