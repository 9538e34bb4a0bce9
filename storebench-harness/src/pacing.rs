use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fixed pauses inserted between benchmark steps.
///
/// Backends get time to settle between writing and reading the same object, and between two full
/// runs. A zero interval skips the pause entirely.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Pacing {
    /// Pause between the upload and the retrieval of one file.
    #[serde(with = "humantime_serde")]
    pub between_operations: Duration,
    /// Pause after each run of a multi-run benchmark.
    #[serde(with = "humantime_serde")]
    pub between_runs: Duration,
}

impl Pacing {
    /// Pacing without any pauses, used for tests.
    pub const fn none() -> Self {
        Self {
            between_operations: Duration::ZERO,
            between_runs: Duration::ZERO,
        }
    }

    pub async fn after_operation(&self) {
        pause(self.between_operations).await
    }

    pub async fn after_run(&self) {
        pause(self.between_runs).await
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            between_operations: Duration::from_secs(2),
            between_runs: Duration::from_secs(10),
        }
    }
}

async fn pause(interval: Duration) {
    if !interval.is_zero() {
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn none_does_not_sleep() {
        let start = Instant::now();
        Pacing::none().after_operation().await;
        Pacing::none().after_run().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_for_the_configured_interval() {
        let pacing = Pacing::default();

        let start = tokio::time::Instant::now();
        pacing.after_operation().await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));

        pacing.after_run().await;
        assert_eq!(start.elapsed(), Duration::from_secs(12));
    }
}
