use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Single-token gate: at most one grant per `min_interval`.
///
/// Callers queue on the mutex, so the next grant always waits for the full
/// interval after the previous one. There is no fairness beyond the mutex.
#[derive(Debug)]
pub struct RateLimiter {
    last_grant: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_grant: Mutex::new(None),
            min_interval,
        }
    }

    pub fn per_second(calls: u32) -> Self {
        assert!(calls > 0, "Rate limiter needs at least one call per second");
        Self::new(Duration::from_secs(1) / calls)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until a call is allowed, then records the grant.
    pub async fn acquire(&self) {
        let mut last = self.last_grant.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!("Rate limiting: waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }
}
