//! Deadline checked opportunistically by the dispatcher
//!
//! Not a real timer: expiry is only noticed when the dispatcher wakes up, so
//! detection lags by at most one poll interval.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Default, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    pub fn arm(&mut self, after: Duration) {
        self.expires_at = Some(Instant::now() + after);
    }

    pub fn disarm(&mut self) {
        self.expires_at = None;
    }

    /// Returns `true` once when the deadline has passed and disarms it
    pub fn take_expired(&mut self) -> bool {
        match self.expires_at {
            Some(at) if Instant::now() >= at => {
                self.expires_at = None;
                true
            }
            _ => false,
        }
    }
}
