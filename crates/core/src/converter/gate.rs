//! Bounded concurrency gate around engine processes.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::error::ConvertError;
use crate::metrics;

/// Snapshot of the gate's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateStatus {
    pub active: usize,
    pub max_concurrent: usize,
    pub queued: usize,
    pub max_queue: usize,
    /// Highest `active` value seen since creation.
    pub peak_active: usize,
    pub total_admitted: u64,
    pub total_rejected: u64,
}

#[derive(Debug, Default)]
struct GateStats {
    active: AtomicUsize,
    queued: AtomicUsize,
    peak_active: AtomicUsize,
    total_admitted: AtomicU64,
    total_rejected: AtomicU64,
}

/// Limits how many engine processes run at once.
///
/// Up to `max_concurrent` callers hold a permit. Up to `max_queue` more wait
/// in arrival order (tokio's semaphore is fair). Anyone beyond that is turned
/// away with [`ConvertError::Overloaded`] instead of waiting indefinitely.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    max_queue: usize,
    stats: Arc<GateStats>,
}

/// Held while an engine process may run. Dropping it frees the slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<GateStats>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decrements the queue counter however the wait ends, cancellation included.
struct QueueSlot<'a>(&'a GateStats);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.queued.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGate {
    pub fn new(max_concurrent: usize, max_queue: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            max_queue,
            stats: Arc::new(GateStats::default()),
        }
    }

    /// Waits for a free slot, or fails fast when the queue is full.
    pub async fn acquire(&self) -> Result<GatePermit, ConvertError> {
        let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let queued = self.stats.queued.fetch_add(1, Ordering::SeqCst);
                let slot = QueueSlot(&self.stats);
                if queued >= self.max_queue {
                    drop(slot);
                    self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
                    metrics::GATE_REJECTIONS.inc();
                    tracing::warn!(
                        max_concurrent = self.max_concurrent,
                        max_queue = self.max_queue,
                        "Conversion queue full, rejecting request"
                    );
                    return Err(ConvertError::Overloaded {
                        max_concurrent: self.max_concurrent,
                        max_queue: self.max_queue,
                    });
                }
                let permit = Arc::clone(&self.semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| ConvertError::Cancelled)?;
                drop(slot);
                permit
            }
        };

        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_active.fetch_max(active, Ordering::SeqCst);
        self.stats.total_admitted.fetch_add(1, Ordering::Relaxed);

        Ok(GatePermit {
            _permit: permit,
            stats: Arc::clone(&self.stats),
        })
    }

    pub fn status(&self) -> GateStatus {
        GateStatus {
            active: self.stats.active.load(Ordering::SeqCst),
            max_concurrent: self.max_concurrent,
            queued: self.stats.queued.load(Ordering::SeqCst),
            max_queue: self.max_queue,
            peak_active: self.stats.peak_active.load(Ordering::SeqCst),
            total_admitted: self.stats.total_admitted.load(Ordering::Relaxed),
            total_rejected: self.stats.total_rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_admits_up_to_capacity() {
        let gate = ConcurrencyGate::new(2, 0);
        let a = gate.acquire().await.unwrap();
        let _b = gate.acquire().await.unwrap();
        assert_eq!(gate.status().active, 2);

        let err = gate.acquire().await.unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Overloaded { max_concurrent: 2, max_queue: 0 }
        ));
        assert_eq!(gate.status().total_rejected, 1);

        drop(a);
        assert_eq!(gate.status().active, 1);
        let _c = gate.acquire().await.unwrap();
        assert_eq!(gate.status().peak_active, 2);
    }

    #[tokio::test]
    async fn test_queue_then_reject() {
        let gate = ConcurrencyGate::new(1, 1);
        let first = gate.acquire().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        // Let the waiter enqueue.
        while gate.status().queued == 0 {
            tokio::task::yield_now().await;
        }

        let err = gate.acquire().await.unwrap_err();
        assert!(matches!(err, ConvertError::Overloaded { .. }));

        drop(first);
        waiter.await.unwrap().unwrap();
        let status = gate.status();
        assert_eq!(status.queued, 0);
        assert_eq!(status.active, 0);
        assert_eq!(status.total_admitted, 2);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_queue() {
        let gate = ConcurrencyGate::new(1, 4);
        let _held = gate.acquire().await.unwrap();

        let result = tokio::time::timeout(Duration::from_millis(20), gate.acquire()).await;
        assert!(result.is_err());
        assert_eq!(gate.status().queued, 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let gate = ConcurrencyGate::new(0, 0);
        assert_eq!(gate.status().max_concurrent, 1);
        let _permit = gate.acquire().await.unwrap();
    }
}
