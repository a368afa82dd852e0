//! Terminal output formatting.

use colored::{ColoredString, Colorize};
use taskwire_client::{CacheScope, ConnectionState};
use taskwire_core::ChangeEvent;

/// Color a change event's kind by what happened to the entity.
pub fn kind_colored(event: &ChangeEvent) -> ColoredString {
    let kind = event.kind();
    match event {
        ChangeEvent::TaskCreated(_) => kind.green(),
        ChangeEvent::TaskDeleted(_) => kind.red(),
        ChangeEvent::TaskUpdated(_) | ChangeEvent::TaskStatusChanged(_) => kind.yellow(),
        ChangeEvent::NoteChanged { .. } | ChangeEvent::ApplicationChanged { .. } => kind.cyan(),
        ChangeEvent::Partial { .. } => kind.white(),
        ChangeEvent::Unknown { .. } => kind.dimmed(),
    }
}

/// Print one received event.
pub fn print_event(event: &ChangeEvent) {
    let id = event.entity_id().unwrap_or("-");
    println!("  {} {} {}", "←".blue(), kind_colored(event), id.dimmed());
}

/// Print a cache invalidation.
pub fn print_invalidation(scope: CacheScope) {
    println!("  {} {}", "⟳".magenta(), format!("invalidate {:?}", scope).bold());
}

pub fn state_colored(state: &ConnectionState) -> ColoredString {
    match state {
        ConnectionState::Connected => "connected".green(),
        ConnectionState::Connecting => "connecting".yellow(),
        ConnectionState::Reconnecting { attempt, .. } => format!("reconnecting (attempt {})", attempt).yellow(),
        ConnectionState::Exhausted => "gave up".red(),
        ConnectionState::Idle => "idle".dimmed(),
    }
}

/// Print a labelled line, as in the startup banners.
pub fn print_field(label: &str, value: &str) {
    println!("  {:<10} {}", label.green(), value);
}
