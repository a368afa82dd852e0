//! Development relay command.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use taskwire_core::{RealtimeConfig, TokenSigner};

use crate::output::print_field;

#[derive(Args)]
pub struct RelayArgs {
    /// Port to listen on
    #[arg(long, default_value = "8080")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
}

pub async fn execute(args: RelayArgs, config: &RealtimeConfig) -> Result<()> {
    let signer = TokenSigner::new(config.auth_secret.as_bytes())?;

    println!();
    println!("  {} {}", "Taskwire".cyan().bold(), "Relay".bold());
    println!();
    print_field("Broadcast", &format!("http://{}:{}/api/broadcast", args.host, args.port));
    print_field("WebSocket", &format!("ws://{}:{}/ws?token=…", args.host, args.port));
    print_field("Health", &format!("http://{}:{}/health", args.host, args.port));
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();

    tokio::select! {
        result = taskwire_web::run_server(signer, &args.host, args.port) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Relay shutting down");
        }
    }

    Ok(())
}
