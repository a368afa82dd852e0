//! Listen command: a terminal stand-in for a browser session.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use taskwire_client::{CacheScope, ProviderOptions, QueryCache, RealtimeProvider};
use taskwire_core::{RealtimeConfig, TokenSigner};

use super::UserArgs;
use crate::output::{print_event, print_field, print_invalidation, state_colored};

#[derive(Args)]
pub struct ListenArgs {
    #[command(flatten)]
    pub user: UserArgs,

    /// Quiet period before cached queries are invalidated, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub debounce_ms: u64,
}

/// Prints invalidations instead of refetching anything.
struct TerminalCache;

impl QueryCache for TerminalCache {
    fn invalidate(&self, scope: CacheScope) {
        print_invalidation(scope);
    }
}

pub async fn execute(args: ListenArgs, config: &RealtimeConfig) -> Result<()> {
    let signer = TokenSigner::new(config.auth_secret.as_bytes())?;
    let token = signer.mint(&args.user.session_user())?;

    let options = ProviderOptions {
        debounce_window: Duration::from_millis(args.debounce_ms),
        ..ProviderOptions::default()
    };
    let mut provider = RealtimeProvider::with_options(config.ws_url.clone(), Arc::new(TerminalCache), options);
    let _printer = provider.client().add_message_handler(print_event);

    println!();
    println!("  {} {}", "Taskwire".cyan().bold(), "Listener".bold());
    println!();
    print_field("User", &args.user.user_id);
    print_field("WebSocket", config.ws_url.as_str());
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();

    provider.mount(&token);

    let mut last_state = provider.client().state();
    let mut poll = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = poll.tick() => {
                let state = provider.client().state();
                if state != last_state {
                    println!("  {} {}", "●".blue(), state_colored(&state));
                    last_state = state;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    provider.dispose();
    Ok(())
}
