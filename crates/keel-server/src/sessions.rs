//! Concurrent session cap.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds the number of live bridge sessions.
#[derive(Debug)]
pub struct SessionLimiter {
    permits: Arc<Semaphore>,
    max: usize,
}

/// Held for the lifetime of one session.
#[derive(Debug)]
pub struct SessionPermit {
    _permit: OwnedSemaphorePermit,
}

impl SessionLimiter {
    /// Allow up to `max` sessions.
    pub fn new(max: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Claim a slot, or `None` when full.
    pub fn try_acquire(&self) -> Option<SessionPermit> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .ok()
            .map(|permit| SessionPermit { _permit: permit })
    }

    /// Sessions currently holding a slot.
    pub fn active(&self) -> usize {
        self.max - self.permits.available_permits()
    }

    /// Configured maximum.
    pub fn max(&self) -> usize {
        self.max
    }
}
