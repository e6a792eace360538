use anyhow::Result;
use clap::Parser;
use ogs_dev::config::{Config, DEFAULT_CONFIG_FILE};
use ogs_dev::tasks::{self, Task};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Development build and serve tool for the OGS web client.
#[derive(Parser, Debug)]
#[command(name = "ogs-dev", version, about)]
struct Cli {
    /// Task to run.
    #[arg(value_enum, default_value_t = Task::Default)]
    task: Task,

    /// Config file; stock settings are used when it doesn't exist.
    #[arg(long, short, env = "OGS_DEV_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level for ogs-dev's own messages. RUST_LOG overrides it.
    #[arg(long, env = "OGS_DEV_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "ogs_dev={},tower_http=warn,hyper=warn,reqwest=warn",
            cli.log_level
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Saved values from .env (real env vars take precedence)
    Config::load_env_file();

    let config = Config::load_or_default(&cli.config)?;
    tracing::debug!(task = ?cli.task, config = %cli.config.display(), "starting");
    tasks::run(cli.task, config).await
}
