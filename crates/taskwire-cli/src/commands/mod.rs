//! CLI command definitions and handlers.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use taskwire_core::config::{
    DEFAULT_WS_URL, ENV_AUTH_SECRET, ENV_BROADCAST_TIMEOUT, ENV_BROADCAST_URL, ENV_WS_URL,
};
use taskwire_core::{RealtimeConfig, SessionUser};

pub mod emit;
pub mod listen;
pub mod relay;
pub mod token;

/// Taskwire - real-time task board sync
#[derive(Parser)]
#[command(name = "taskwire")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// WebSocket URL of the real-time service
    #[arg(long, global = true, env = ENV_WS_URL, default_value = DEFAULT_WS_URL)]
    pub ws_url: String,

    /// Broadcast endpoint; derived from the WebSocket URL when omitted
    #[arg(long, global = true, env = ENV_BROADCAST_URL)]
    pub broadcast_url: Option<String>,

    /// Shared signing secret
    #[arg(long, global = true, env = ENV_AUTH_SECRET, hide_env_values = true)]
    pub secret: Option<String>,

    /// Broadcast request timeout in seconds
    #[arg(long, global = true, env = ENV_BROADCAST_TIMEOUT, default_value_t = 10)]
    pub broadcast_timeout: u64,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the development relay
    Relay(relay::RelayArgs),

    /// Connect as a user and print incoming events
    Listen(listen::ListenArgs),

    /// Broadcast a single change event
    Emit(emit::EmitArgs),

    /// Mint a signed token for a user
    Token(token::TokenArgs),
}

/// Identity to act as.
#[derive(Args, Debug, Clone)]
pub struct UserArgs {
    /// User id (token subject)
    #[arg(long, default_value = "dev-user")]
    pub user_id: String,

    /// User email
    #[arg(long, default_value = "dev@localhost")]
    pub email: String,
}

impl UserArgs {
    pub fn session_user(&self) -> SessionUser {
        SessionUser::new(&self.user_id, &self.email)
    }
}

impl Cli {
    /// Resolve configuration. Flags already carry their environment values,
    /// so they feed the same lookup the library uses for the environment.
    pub fn realtime_config(&self) -> Result<RealtimeConfig> {
        let timeout = self.broadcast_timeout.to_string();
        let config = RealtimeConfig::from_lookup(|key| match key {
            ENV_WS_URL => Some(self.ws_url.clone()),
            ENV_BROADCAST_URL => self.broadcast_url.clone(),
            ENV_AUTH_SECRET => self.secret.clone(),
            ENV_BROADCAST_TIMEOUT => Some(timeout.clone()),
            _ => None,
        })?;
        tracing::debug!(config = ?config, "Resolved configuration");
        Ok(config)
    }

    pub async fn execute(self) -> Result<()> {
        let config = self.realtime_config()?;

        match self.command {
            Commands::Relay(args) => relay::execute(args, &config).await,
            Commands::Listen(args) => listen::execute(args, &config).await,
            Commands::Emit(args) => emit::execute(args, &config).await,
            Commands::Token(args) => token::execute(args, &config),
        }
    }
}
