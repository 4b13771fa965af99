//! Reconnect delay with exponential backoff and one admin alert per outage.

use std::time::Duration;

/// What the next reconnect attempt should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconnect {
    /// Wait this long before reconnecting.
    pub delay: Duration,
    /// Alert the admins before waiting.
    pub notify: bool,
}

/// Backoff state across consecutive failed connections.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    initial: Duration,
    max: Duration,
    current: Duration,
    notified: bool,
}

impl ReconnectState {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
            notified: false,
        }
    }

    /// Schedule one retry: use the current delay, then double it up to the cap.
    ///
    /// The first retry that waits the full cap raises the outage alert.
    pub fn next(&mut self) -> Reconnect {
        let delay = self.current;
        let notify = delay >= self.max && !self.notified;
        if notify {
            self.notified = true;
        }
        self.current = self.current.saturating_mul(2).min(self.max);
        Reconnect { delay, notify }
    }

    /// Connection is healthy again.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.notified = false;
    }

    pub fn current_delay(&self) -> Duration {
        self.current
    }
}
