use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::DetectorFailure;

/// Bounded executor for blocking frame work: decoding and detector calls.
///
/// At most `size` jobs run at once across every session. A job keeps its permit
/// until it returns, even if the caller stopped waiting for it, so abandoned
/// external calls still count against the bound.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
    saturation_events: AtomicU64,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            saturation_events: AtomicU64::new(0),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs that could not start immediately because every worker was busy.
    pub fn saturation_events(&self) -> u64 {
        self.saturation_events.load(Ordering::Relaxed)
    }

    pub fn in_use(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    /// Run `job` on a blocking worker once a slot is free.
    ///
    /// A panic inside `job` is reported as `DetectorFailure::Panicked`.
    pub async fn run<F, T>(&self, job: F) -> Result<T, DetectorFailure>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.permits.available_permits() == 0 {
            let events = self.saturation_events.fetch_add(1, Ordering::Relaxed) + 1;
            log::warn!(
                "worker pool saturated ({} workers busy, {} saturation events)",
                self.size,
                events
            );
        }

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DetectorFailure::PoolClosed)?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });

        handle.await.map_err(|err| {
            if err.is_panic() {
                DetectorFailure::Panicked
            } else {
                DetectorFailure::PoolClosed
            }
        })
    }

    /// Stop accepting jobs. Jobs already running finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn bounds_concurrent_jobs() {
        let pool = Arc::new(WorkerPool::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..6).map(|_| {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            async move {
                pool.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }
        });
        let results = futures::future::join_all(jobs).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(pool.saturation_events() > 0);
        assert_eq!(pool.in_use(), 0);
    }

    #[tokio::test]
    async fn panics_become_failures() {
        let pool = WorkerPool::new(1);
        let result: Result<(), _> = pool.run(|| panic!("boom")).await;
        assert_eq!(result.unwrap_err(), DetectorFailure::Panicked);

        // The permit is released after the panic.
        assert_eq!(pool.run(|| 7).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn closed_pool_rejects_jobs() {
        let pool = WorkerPool::new(1);
        pool.close();
        assert_eq!(pool.run(|| ()).await.unwrap_err(), DetectorFailure::PoolClosed);
    }
}
