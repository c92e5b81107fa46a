//! Terraform Provider for SailPoint
//!
//! Serves the Terraform plugin protocol over stdin/stdout. Logs go to stderr.

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};
use terraform_provider_sailpoint::SailPointProvider;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Terraform Provider for SailPoint Identity Security Cloud
#[derive(Parser, Debug)]
#[command(name = "terraform-provider-sailpoint", version)]
#[command(about = "Terraform provider for SailPoint Identity Security Cloud managed clusters")]
struct Args {
    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Log level used when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, env = "TF_LOG", value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn filter(&self) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
        let level = match (self.debug, self.log_level.as_deref()) {
            (true, _) => "debug".to_string(),
            (false, Some(level)) => level.to_lowercase(),
            (false, None) => "info".to_string(),
        };
        EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(args.filter())
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    tracing::info!(version = terraform_provider_sailpoint::provider::VERSION, "Starting Terraform Provider for SailPoint");

    let provider = SailPointProvider::new().context("failed to create Tokio runtime")?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();

    for line in stdin.lock().lines() {
        let input = match line {
            Ok(input) => input,
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                break;
            }
        };

        if input.trim().is_empty() {
            continue;
        }

        let response = provider.handle_request(&input);
        if let Err(e) = writeln!(stdout_lock, "{}", response).and_then(|_| stdout_lock.flush()) {
            tracing::error!("Failed to write response: {}", e);
            break;
        }
    }

    tracing::info!("Terraform Provider shutting down");
    Ok(())
}
