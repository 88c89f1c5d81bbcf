mod run;
mod status;
mod targets;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "crystal-cli")]
#[command(about = "Crystal crawl orchestration command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one crawl and wait for it to finish.
    Run {
        /// Platform to crawl; repeatable. Defaults to all platforms.
        #[arg(long = "platform")]
        platforms: Vec<String>,
        /// Platform-local calendar day to collect (YYYY-MM-DD).
        /// Defaults to yesterday.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show per-platform session health and recent crawl runs.
    Status,
    /// Add a watch target.
    AddTarget(targets::AddTargetArgs),
    /// List watch targets.
    ListTargets {
        #[arg(long)]
        platform: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = crystal_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = crystal_db::PoolConfig::from_app_config(&config);
    let pool = crystal_db::connect_pool(&config.database_url, pool_config).await?;
    crystal_db::run_migrations(&pool).await?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { platforms, date } => run::run_crawl(&pool, &config, &platforms, date).await,
        Commands::Status => status::print_status(&pool).await,
        Commands::AddTarget(args) => targets::add_target(&pool, &args).await,
        Commands::ListTargets { platform } => {
            targets::list_targets(&pool, platform.as_deref()).await
        }
    }
}
