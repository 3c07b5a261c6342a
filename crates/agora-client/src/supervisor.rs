//! Fixed-delay reconnection policy.
//!
//! The supervisor only decides *when* to reopen; the room task owns the
//! transport and acts on [`ReconnectSupervisor::take_due`].

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ReconnectSupervisor {
    armed: bool,
    pending: Option<Instant>,
    delay: Duration,
    attempts: u32,
}

impl ReconnectSupervisor {
    pub fn new(delay: Duration) -> Self {
        Self {
            armed: false,
            pending: None,
            delay,
            attempts: 0,
        }
    }

    /// The user intends to stay connected.
    pub fn arm(&mut self) {
        self.armed = true;
    }

    /// The user left: stop reconnecting and drop any pending attempt.
    pub fn disarm(&mut self) {
        self.armed = false;
        self.cancel();
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Deadline of the outstanding reopen attempt, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending
    }

    /// Consecutive reopen attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// React to a closed connection. Returns `true` if a reopen was scheduled.
    ///
    /// At most one attempt is outstanding at a time.
    pub fn on_closed(&mut self, now: Instant) -> bool {
        if !self.armed {
            debug!("Connection closed while disarmed, not reconnecting");
            return false;
        }
        if self.pending.is_some() {
            return false;
        }

        self.pending = Some(now + self.delay);
        self.attempts += 1;
        info!(
            attempt = self.attempts,
            delay_ms = self.delay.as_millis() as u64,
            "Scheduled reconnect"
        );
        true
    }

    /// The connection is usable again.
    pub fn on_opened(&mut self) {
        self.cancel();
        self.attempts = 0;
    }

    /// Consume the pending attempt if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(deadline) if self.armed && deadline <= now => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Drop the pending attempt. Returns `true` if one was outstanding.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }
}
