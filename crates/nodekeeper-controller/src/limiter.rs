//! ConcurrencyLimiter — a counting gate with FIFO admission.
//!
//! Built on `tokio::sync::Semaphore`, whose waiters are served strictly in
//! the order they called `acquire`. A `Slot` holds one permit; dropping it
//! (on success, error, or a panic unwinding the task) releases the permit
//! and admits the oldest waiter.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use crate::error::{LimiterError, LimiterResult};

#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// One admitted task's claim on the limiter.
pub struct Slot {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> LimiterResult<Self> {
        if capacity == 0 {
            return Err(LimiterError::ZeroCapacity);
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            counters: Arc::new(Counters::default()),
        })
    }

    /// Wait for a slot. Callers are admitted in the order they called.
    pub async fn acquire(&self) -> LimiterResult<Slot> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| LimiterError::Closed)?;

        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(now, Ordering::SeqCst);
        trace!(in_flight = now, capacity = self.capacity, "slot acquired");

        Ok(Slot {
            _permit: permit,
            counters: self.counters.clone(),
        })
    }

    /// Run `task` inside a slot. The slot is released when `task` finishes,
    /// whatever its output.
    pub async fn run<F, T>(&self, task: F) -> LimiterResult<T>
    where
        F: Future<Output = T>,
    {
        let _slot = self.acquire().await?;
        Ok(task.await)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots free right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Highest `in_flight` observed since creation.
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Refuse all current and future waiters.
    pub fn close(&self) {
        self.semaphore.close();
    }
}
