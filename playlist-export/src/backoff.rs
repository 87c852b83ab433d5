//! Wait-it-out retry policy for quota-limited API calls.

use crate::error::ApiError;
use jiff::{SignedDuration, Zoned};
use std::future::Future;
use std::time::Duration;

/// Exponential backoff without jitter or retry limit.
///
/// The wait after the `k`th consecutive rate-limited attempt is
/// `min(initial * 2^(k-1), max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(900),
            max: Duration::from_secs(3600),
        }
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// How long to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Runs `attempt` until it succeeds or fails with something other than a rate limit.
    ///
    /// Rate-limited failures block the caller for the backoff delay and are retried
    /// indefinitely. Every other error is returned immediately.
    pub async fn retry<T, F, Fut>(&self, mut attempt: F) -> eyre::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = eyre::Result<T>>,
    {
        let mut failures = 0;
        loop {
            match attempt().await {
                Ok(value) => {
                    if failures > 0 {
                        tracing::info!(failures, "request succeeded after backing off");
                    }
                    return Ok(value);
                }
                Err(e) if ApiError::is_rate_limited_report(&e) => {
                    failures += 1;
                    let delay = self.delay_for(failures);
                    let retry_at = retry_timestamp(delay).unwrap_or_else(|| "unknown".into());
                    tracing::warn!(
                        attempt = failures,
                        error = %e,
                        "Quota exceeded, retrying in {} minutes at {retry_at}",
                        delay.as_secs() / 60,
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Local wall-clock time `delay` from now, formatted for humans.
fn retry_timestamp(delay: Duration) -> Option<String> {
    let delay = SignedDuration::try_from(delay).ok()?;
    let at = Zoned::now().checked_add(delay).ok()?;
    Some(at.strftime("%Y-%m-%d %H:%M:%S").to_string())
}
