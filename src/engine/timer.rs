//! One-shot retransmission timer
//!
//! The engine never sleeps. A running timer only records a deadline; the
//! owner of the event loop polls [`Timer::expired`] and feeds the expiry back
//! into the FSM as an ordinary event.

use std::time::{Duration, Instant};

/// Default restart interval (RFC 1661 suggests 3 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct Timer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl Timer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Takes effect the next time the timer is started
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Arm the timer, replacing any pending deadline
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    pub fn start_at(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check for expiry; an expired timer disarms itself so it fires once
    pub fn expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}
