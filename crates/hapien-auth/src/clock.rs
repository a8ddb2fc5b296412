//! Injectable time source for polling and timeouts.

use async_trait::async_trait;
use std::time::Duration;

/// Suspends the caller for a duration.
///
/// Flows take an `Arc<dyn Clock>` instead of calling `tokio::time::sleep`
/// directly so tests can run them without real timers.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Fake clock: every sleep returns at once and is recorded.
    #[derive(Default)]
    pub struct RecordingClock {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl RecordingClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }

        pub fn total(&self) -> Duration {
            self.sleeps().iter().sum()
        }
    }

    #[async_trait]
    impl Clock for RecordingClock {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            tokio::task::yield_now().await;
        }
    }

    /// Clock whose sleeps never finish.
    pub struct FrozenClock;

    #[async_trait]
    impl Clock for FrozenClock {
        async fn sleep(&self, _duration: Duration) {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingClock;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_advances_paused_time() {
        let start = tokio::time::Instant::now();
        TokioClock.sleep(Duration::from_millis(500)).await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_recording_clock_records() {
        let clock = RecordingClock::new();
        clock.sleep(Duration::from_millis(100)).await;
        clock.sleep(Duration::from_millis(200)).await;

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
        assert_eq!(clock.total(), Duration::from_millis(300));
    }
}
