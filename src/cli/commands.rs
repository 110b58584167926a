//! CLI command definitions and handlers

use clap::Subcommand;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::core::config::GatewayConfig;
use crate::core::gateway::AiGateway;
use crate::core::models::DispatchResult;
use crate::core::store::{FileStore, MemoryStore, OptionStore};

/// Commands for the AI Guardian gateway
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dispatch one prompt through the gateway
    Generate {
        /// Prompt text to send
        prompt: String,

        /// Free-tier daily ceiling for this call site
        #[arg(long)]
        max_calls: Option<u32>,

        /// JSON file holding quota state and runtime options
        #[arg(long)]
        state_file: Option<PathBuf>,
    },

    /// Show the daily usage snapshot
    Usage {
        /// JSON file holding quota state and runtime options
        #[arg(long)]
        state_file: Option<PathBuf>,
    },

    /// Reset the daily call counter (external scheduler entry point)
    Reset {
        /// JSON file holding quota state and runtime options
        #[arg(long)]
        state_file: Option<PathBuf>,
    },

    /// Start the HTTP API server
    Server {
        /// Bind address (default: 127.0.0.1)
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Listen port (default: 8000)
        #[arg(short, long, default_value_t = 8000)]
        port: u16,

        /// JSON file holding quota state and runtime options
        #[arg(long)]
        state_file: Option<PathBuf>,
    },
}

/// Build a gateway over the optional state file
fn gateway_from(state_file: Option<PathBuf>) -> anyhow::Result<AiGateway> {
    let config = GatewayConfig::load()?;
    let store: Arc<dyn OptionStore> = match state_file {
        Some(path) => Arc::new(FileStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    };
    Ok(AiGateway::with_store(config, store)?)
}

/// Handle the generate command
pub async fn handle_generate(
    prompt: String,
    max_calls: Option<u32>,
    state_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let gateway = gateway_from(state_file)?;
    let max_calls = max_calls.unwrap_or(gateway.config().default_max_calls);

    let result = gateway.generate_with_limit(&prompt, max_calls).await?;

    match &result {
        DispatchResult::Success { text, cached } => {
            if *cached {
                info!("served from cache");
            }
            println!("{}", text);
        }
        DispatchResult::Fallback(payload) => {
            println!("{}", payload.note);
            println!("Suggested fix: {}", payload.fix);
            for suggestion in &payload.suggestions {
                println!("  - {}", suggestion);
            }
        }
        DispatchResult::QuotaExceeded { message } => {
            println!("{}", message);
        }
    }

    Ok(())
}

/// Handle the usage command
pub async fn handle_usage(state_file: Option<PathBuf>) -> anyhow::Result<()> {
    let gateway = gateway_from(state_file)?;
    let stats = gateway.usage_stats();

    println!("Calls today:     {}", stats.calls_today);
    println!("Last reset:      {}", stats.last_reset_date);
    println!("Next reset:      {}", stats.next_reset_date);
    println!(
        "Tier:            {}",
        if stats.is_premium { "premium" } else { "free" }
    );

    Ok(())
}

/// Handle the reset command
pub async fn handle_reset(state_file: Option<PathBuf>) -> anyhow::Result<()> {
    let gateway = gateway_from(state_file)?;
    gateway.reset_quota()?;
    println!("Daily AI call counter reset.");
    Ok(())
}

/// Handle the server command
pub async fn handle_server(
    host: String,
    port: u16,
    state_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    crate::server::api::run_server(host, port, state_file).await
}
