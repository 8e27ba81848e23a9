//! Ping/pong liveness bookkeeping.

use std::time::Duration;

/// What to do on a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatTick {
    /// Client still within its allowance; send another ping.
    Ping,
    /// The client stopped responding within the timeout window.
    TimedOut,
}

/// Counts consecutive heartbeat intervals without any inbound frame.
///
/// `max_missed` is `timeout / interval`, clamped to at least 1.
#[derive(Debug)]
pub struct Heartbeat {
    alive: bool,
    missed: u32,
    max_missed: u32,
}

impl Heartbeat {
    /// Create a monitor for the given interval and timeout.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let max_missed = u32::try_from(timeout.as_millis() / interval_ms)
            .unwrap_or(u32::MAX)
            .max(1);
        Self {
            alive: true,
            missed: 0,
            max_missed,
        }
    }

    /// Record activity from the client (pong or any other frame).
    pub fn mark_alive(&mut self) {
        self.alive = true;
    }

    /// Advance one interval.
    pub fn tick(&mut self) -> HeartbeatTick {
        if std::mem::replace(&mut self.alive, false) {
            self.missed = 0;
        } else {
            self.missed += 1;
            if self.missed >= self.max_missed {
                return HeartbeatTick::TimedOut;
            }
        }
        HeartbeatTick::Ping
    }

    /// Consecutive silent intervals tolerated.
    pub fn max_missed(&self) -> u32 {
        self.max_missed
    }
}
