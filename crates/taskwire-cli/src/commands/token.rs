//! Token minting command.

use anyhow::Result;
use clap::Args;
use taskwire_core::{RealtimeConfig, TokenSigner};

use super::UserArgs;

#[derive(Args)]
pub struct TokenArgs {
    #[command(flatten)]
    pub user: UserArgs,
}

pub fn execute(args: TokenArgs, config: &RealtimeConfig) -> Result<()> {
    let signer = TokenSigner::new(config.auth_secret.as_bytes())?;
    let token = signer.mint(&args.user.session_user())?;
    println!("{}", token);
    Ok(())
}
