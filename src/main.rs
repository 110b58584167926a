//! Main entry point for the AI Guardian CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod core;
mod server;

use cli::commands::Commands;

/// AI Guardian - AI diagnostics gateway
#[derive(Parser, Debug)]
#[command(name = "ai-guardian", version, about, long_about = None)]
struct Args {
    /// API key for the upstream provider (defaults to AIG_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Override config with CLI args if provided
    if let Some(api_key) = args.api_key {
        std::env::set_var("AIG_API_KEY", api_key);
    }

    // Initialize logging
    let log_level = if args.verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ai_guardian={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Execute command
    match args.command {
        Some(Commands::Generate {
            prompt,
            max_calls,
            state_file,
        }) => {
            cli::commands::handle_generate(prompt, max_calls, state_file).await?;
        }
        Some(Commands::Usage { state_file }) => {
            cli::commands::handle_usage(state_file).await?;
        }
        Some(Commands::Reset { state_file }) => {
            cli::commands::handle_reset(state_file).await?;
        }
        Some(Commands::Server {
            host,
            port,
            state_file,
        }) => {
            cli::commands::handle_server(host, port, state_file).await?;
        }
        None => {
            println!("Please specify a command. Use --help for more information.");
        }
    }

    Ok(())
}
