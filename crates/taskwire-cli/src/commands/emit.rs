//! Emit command: broadcast one change event, as a server would after a mutation.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::{Map, Value};
use taskwire_core::{BroadcastEmitter, ChangeEvent, Envelope, RealtimeConfig};

use super::UserArgs;
use crate::output::kind_colored;

#[derive(Args)]
pub struct EmitArgs {
    /// Event type, e.g. task_status_changed or note_updated
    pub kind: String,

    /// Id of the changed entity
    #[arg(long)]
    pub id: String,

    /// Extra payload field as key=value; JSON values are kept typed
    #[arg(long = "field", value_name = "KEY=VALUE")]
    pub fields: Vec<String>,

    #[command(flatten)]
    pub user: UserArgs,
}

pub async fn execute(args: EmitArgs, config: &RealtimeConfig) -> Result<()> {
    let event = build_event(&args.kind, &args.id, &args.fields)?;
    let emitter = BroadcastEmitter::new(config)?;

    emitter
        .try_broadcast(&args.user.session_user(), &event)
        .await
        .with_context(|| format!("Broadcast to {} failed", emitter.endpoint()))?;

    println!("{} {} {}", "✓".green(), kind_colored(&event), args.id.dimmed());
    Ok(())
}

/// Assemble a change event from command-line parts.
pub fn build_event(kind: &str, id: &str, fields: &[String]) -> Result<ChangeEvent> {
    let mut payload = Map::new();
    payload.insert("id".to_string(), Value::String(id.to_string()));

    for field in fields {
        let Some((key, raw)) = field.split_once('=') else {
            bail!("Invalid field '{}', expected KEY=VALUE", field);
        };
        if key.is_empty() {
            bail!("Invalid field '{}', key is empty", field);
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        payload.insert(key.to_string(), value);
    }

    let event = ChangeEvent::from_envelope(Envelope::new(kind, Value::Object(payload)));
    if let ChangeEvent::Partial { .. } = event {
        bail!("Payload does not fit '{}'", kind);
    }
    Ok(event)
}
