//! Concurrency gate for in-flight upstream operations
//!
//! A bounded semaphore caps simultaneous dispatches. Acquisition polls with
//! exponential backoff plus jitter instead of queueing: once the time budget
//! is spent the dispatch is rejected, so a saturated gate sheds load rather
//! than building an unbounded waiter line.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

/// Initial backoff between acquisition polls.
const BACKOFF_BASE: Duration = Duration::from_millis(50);
/// Backoff multiplier per failed poll.
const BACKOFF_FACTOR: f64 = 1.5;
/// Backoff ceiling.
const BACKOFF_CAP: Duration = Duration::from_millis(2_000);

/// Bounded gate over concurrent operations.
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    budget: Duration,
}

impl ConcurrencyGate {
    /// `capacity = 0` selects the host default of `max(50, cpu_count * 4)`.
    pub fn new(capacity: usize, budget: Duration) -> Self {
        let capacity = if capacity == 0 {
            Self::auto_capacity()
        } else {
            capacity
        };
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            budget,
        }
    }

    /// Host-derived default capacity.
    pub fn auto_capacity() -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        (cpus * 4).max(50)
    }

    /// Acquire a slot, backing off up to the time budget. `None` means the
    /// gate stayed full for the whole budget and the dispatch is rejected.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        let started = Instant::now();
        let mut delay = BACKOFF_BASE;

        loop {
            if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
                return Some(permit);
            }
            let remaining = self.budget.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                warn!(
                    capacity = self.capacity,
                    budget_ms = self.budget.as_millis() as u64,
                    "concurrency gate acquisition timed out"
                );
                return None;
            }

            let jitter = Duration::from_millis(
                rand::rng().random_range(0..=(delay.as_millis() as u64 / 4).max(1)),
            );
            tokio::time::sleep((delay + jitter).min(remaining)).await;
            delay = Duration::from_millis(
                ((delay.as_millis() as f64 * BACKOFF_FACTOR) as u64)
                    .min(BACKOFF_CAP.as_millis() as u64),
            );
        }
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_when_free() {
        let gate = ConcurrencyGate::new(2, Duration::from_millis(100));
        let p1 = gate.acquire().await;
        assert!(p1.is_some());
        assert_eq!(gate.in_flight(), 1);

        let p2 = gate.acquire().await;
        assert!(p2.is_some());
        assert_eq!(gate.in_flight(), 2);
    }

    #[tokio::test]
    async fn release_frees_the_slot() {
        let gate = ConcurrencyGate::new(1, Duration::from_millis(100));
        let permit = gate.acquire().await.unwrap();
        assert_eq!(gate.in_flight(), 1);

        drop(permit);
        assert_eq!(gate.in_flight(), 0);
        assert!(gate.acquire().await.is_some());
    }

    #[tokio::test]
    async fn rejects_after_budget_when_full() {
        let gate = ConcurrencyGate::new(1, Duration::from_millis(120));
        let _held = gate.acquire().await.unwrap();

        let started = Instant::now();
        let second = gate.acquire().await;
        assert!(second.is_none(), "full gate must reject, not queue");
        assert!(
            started.elapsed() >= Duration::from_millis(120),
            "rejection must wait out the budget"
        );
    }

    #[tokio::test]
    async fn waiter_gets_slot_freed_mid_backoff() {
        let gate = Arc::new(ConcurrencyGate::new(1, Duration::from_secs(5)));
        let permit = gate.acquire().await.unwrap();

        let gate2 = gate.clone();
        let waiter = tokio::spawn(async move { gate2.acquire().await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(permit);

        let acquired = waiter.await.unwrap();
        assert!(acquired.is_some());
    }

    #[test]
    fn auto_capacity_has_floor_of_fifty() {
        assert!(ConcurrencyGate::auto_capacity() >= 50);
    }

    #[test]
    fn zero_capacity_selects_auto() {
        let gate = ConcurrencyGate::new(0, Duration::from_secs(1));
        assert!(gate.capacity() >= 50);
    }
}
