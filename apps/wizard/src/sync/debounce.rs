use std::time::Duration;

use tokio::time::Instant;

/// A cancellable quiet-period timer. Holds no task of its own: the owner asks
/// for the deadline, sleeps until it, then calls `poll_due`.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// Arms the timer, or pushes an armed one back to `now + quiet`.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    /// Disarms the timer. Returns whether anything was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Fires immediately: disarms and reports whether a fire was pending.
    pub fn flush(&mut self) -> bool {
        self.cancel()
    }

    /// Disarms and returns true once the deadline has passed.
    pub fn poll_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}
