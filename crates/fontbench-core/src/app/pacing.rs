//! Pacing policy: decides how long to wait between task sweeps.

use std::time::Duration;

use rand::Rng;

use crate::config::CompleteConfig;

/// Pause applied after a task sweep that invoked at least one worker.
///
/// delay = base + uniform(0..=jitter)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingPolicy {
    pub base: Duration,
    pub jitter: Duration,
}

impl PacingPolicy {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    /// No waiting at all (tests, local endpoints).
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn from_config(config: &CompleteConfig) -> Self {
        Self::new(
            Duration::from_millis(config.pacing_ms),
            Duration::from_millis(config.pacing_jitter_ms),
        )
    }

    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.base;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        self.base + Duration::from_millis(extra)
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self::from_config(&CompleteConfig::default())
    }
}
