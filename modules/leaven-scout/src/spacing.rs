use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

use leaven_common::SpacingConfig;

/// Enforces a jittered minimum gap between submissions to one upstream
/// endpoint. Shared by every worker that talks to that endpoint.
pub struct RequestSpacer {
    min: Duration,
    max: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestSpacer {
    pub fn new(config: SpacingConfig) -> Self {
        Self {
            min: Duration::from_millis(config.min_ms),
            max: Duration::from_millis(config.min_ms.max(config.max_ms)),
            last: Mutex::new(None),
        }
    }

    pub fn disabled() -> Self {
        Self::new(SpacingConfig { min_ms: 0, max_ms: 0 })
    }

    /// Wait until the next submission is allowed, then claim the slot.
    /// The first call never waits.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.next_gap()).await;
        }
        *last = Some(Instant::now());
    }

    fn next_gap(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let ms = rand::rng().random_range(self.min.as_millis() as u64..=self.max.as_millis() as u64);
        Duration::from_millis(ms)
    }
}
