mod environment;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use wayfarer_agent::{render, RunController, RunOutcome};
use wayfarer_core::config::AppConfig;

use environment::LiveEnvironment;

#[derive(Parser)]
#[command(
    name = "wayfarer",
    version,
    about = "Find three short-stay listings for a location and summarize the best pick"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "wayfarer.toml")]
    config: PathBuf,

    /// MCP server config (`{"mcpServers": {...}}`), overrides `session.config_path`
    #[arg(long)]
    mcp_config: Option<PathBuf>,

    /// Seconds to wait for MCP servers to shut down
    #[arg(long)]
    close_timeout: Option<u64>,

    /// Location to search; prompts on stdin when omitted
    #[arg(trailing_var_arg = true)]
    query: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wayfarer=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "Loaded .env");
    }

    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            println!("Error: {}", e);
            1
        }
    };

    println!("\nCleanup complete");
    // A cancelled stdin read would otherwise keep the runtime alive.
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config = AppConfig::load_or_default(&cli.config)?;
    if let Some(path) = cli.mcp_config {
        config.session.config_path = path;
    }
    if let Some(secs) = cli.close_timeout {
        config.session.close_timeout_secs = secs;
    }

    let query = (!cli.query.is_empty()).then(|| cli.query.join(" "));
    let close_timeout = Duration::from_secs(config.session.close_timeout_secs);
    let key_env = config.model.api_key_env.clone();
    let env = LiveEnvironment::new(config, query);

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Interrupt received, shutting down...");
        cancel_clone.cancel();
    });

    let code = match RunController::new(close_timeout).run(&env, cancel).await {
        RunOutcome::Completed(record) => {
            render(&record, &mut std::io::stdout().lock())?;
            0
        }
        RunOutcome::Skipped => 0,
        RunOutcome::MissingCredential => {
            println!("Missing {}", key_env);
            1
        }
        RunOutcome::Failed(message) => {
            println!("Error: {}", message);
            1
        }
        RunOutcome::Cancelled => {
            println!("\nOperation cancelled");
            130
        }
    };
    Ok(code)
}
