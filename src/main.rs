use std::path::PathBuf;
use std::sync::Arc;
use anyhow::Result;
use clap::Parser;
use tokio::io::{stdin, stdout, BufReader};
use tracing::{error, info};

use ai_inference::InferenceServer;
use config::ConfigManager;

/// Inference request admission and batching service
#[derive(Parser, Debug)]
#[command(name = "ai-inference", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = match &cli.config {
        Some(path) => ConfigManager::from_file(path)?,
        None => ConfigManager::new()?,
    };

    if let Some(level) = &cli.log_level {
        config_manager.set("log_level", level)?;
    }

    InferenceServer::init_logging(&config_manager)?;

    let server = InferenceServer::new(Arc::new(config_manager));
    info!("Reading commands from stdin");

    tokio::select! {
        result = server.serve(BufReader::new(stdin()), stdout()) => {
            if let Err(e) = &result {
                error!("Command loop failed: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
    }

    server.shutdown().await;

    Ok(())
}
