//! Connection state tracking and reconnect backoff.
//!
//! Kept free of I/O so the reconnect schedule can be checked directly.

use std::time::Duration;

/// Maximum reconnection attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// First reconnect delay, and the delay restored after a successful open.
pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Ceiling for the reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_millis(30_000);

/// Observable state of a real-time connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and nothing scheduled.
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Socket open.
    Connected,
    /// Waiting `delay` before reconnect attempt number `attempt`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Attempts used up; only an explicit connect starts over.
    Exhausted,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// True while a socket exists or is being opened.
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Connecting)
    }
}

/// Reconnect limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            initial_delay: INITIAL_RECONNECT_DELAY,
            max_delay: MAX_RECONNECT_DELAY,
        }
    }
}

/// Exponential backoff: the delay doubles after each scheduled attempt,
/// capped at the policy ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
    delay: Duration,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            delay: policy.initial_delay,
        }
    }

    /// Number of reconnects scheduled since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay the next scheduled reconnect would use.
    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    /// Called when a socket opens.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.delay = self.policy.initial_delay;
    }

    /// Called on an unintentional close. Returns the attempt number and the
    /// delay to wait, or `None` once attempts are exhausted.
    pub fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        let delay = self.delay;
        self.delay = self.delay.saturating_mul(2).min(self.policy.max_delay);
        Some((self.attempts, delay))
    }
}
