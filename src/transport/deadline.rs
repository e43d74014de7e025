//! Absolute deadlines for socket operations.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Phase, TransportError};

/// Roughly thirty years; used when a relative timeout would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A point in time by which an operation must complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// A deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        Self(
            now.checked_add(timeout)
                .unwrap_or_else(|| now + FAR_FUTURE),
        )
    }

    /// Returns the underlying instant.
    #[must_use]
    pub const fn instant(self) -> Instant {
        self.0
    }

    /// Returns true once the deadline has passed.
    #[must_use]
    pub fn is_expired(self) -> bool {
        Instant::now() >= self.0
    }

    /// Time left before expiry, zero once expired.
    #[must_use]
    pub fn remaining(self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// The earlier of this deadline and one `timeout` from now.
    #[must_use]
    pub fn min_after(self, timeout: Duration) -> Self {
        self.min(Self::after(timeout))
    }
}

/// Runs `operation` until `deadline`, reporting expiry as a timeout in `phase`.
///
/// `None` means the operation may wait indefinitely.
pub(crate) async fn bounded<F>(
    deadline: Option<Deadline>,
    phase: Phase,
    operation: F,
) -> Result<F::Output, TransportError>
where
    F: Future,
{
    match deadline {
        Some(limit) => tokio::time::timeout_at(limit.instant(), operation)
            .await
            .map_err(|_| TransportError::Timeout { phase }),
        None => Ok(operation.await),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn zero_timeout_is_immediately_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[rstest]
    fn huge_timeout_does_not_overflow() {
        let deadline = Deadline::after(Duration::MAX);
        assert!(!deadline.is_expired());
    }

    #[rstest]
    fn min_after_picks_earlier_deadline() {
        let long = Deadline::after(Duration::from_secs(60));
        let clamped = long.min_after(Duration::from_secs(1));
        assert!(clamped < long);
        assert!(clamped.remaining() <= Duration::from_secs(1));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn bounded_reports_timeout_in_phase() {
        let deadline = Deadline::after(Duration::from_millis(10));
        let result = bounded(
            Some(deadline),
            Phase::ReadBody,
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await;
        assert!(matches!(
            result,
            Err(TransportError::Timeout {
                phase: Phase::ReadBody
            })
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn bounded_without_deadline_waits_for_completion() {
        let result = bounded(None, Phase::Write, async { 7 }).await;
        assert!(matches!(result, Ok(7)));
    }
}
