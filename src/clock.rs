use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Time source for the sync engine and scheduler.
/// Production uses tokio timers; tests inject a fake that advances instantly.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);

    /// Sleep until the wall-clock deadline (returns immediately if it already passed)
    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        let now = self.now();
        if deadline > now {
            let wait = (deadline - now).to_std().unwrap_or_default();
            self.sleep(wait).await;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
