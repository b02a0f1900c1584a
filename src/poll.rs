use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{sleep, Instant};

/// How often and for how long `wait_for` keeps checking a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two checks
    pub interval: Duration,
    /// Overall budget; `None` keeps polling until the condition holds
    pub timeout: Option<Duration>,
    /// Upper bound of the random delay added to each sleep
    pub jitter: Duration,
}

impl PollPolicy {
    pub fn bounded(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout: Some(timeout),
            jitter: Duration::ZERO,
        }
    }

    pub fn forever(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
            jitter: Duration::ZERO,
        }
    }

    /// Builds a policy from millisecond values, where a zero timeout means
    /// "retry forever".
    pub fn from_millis(timeout_ms: u64, interval_ms: u64) -> Self {
        let interval = Duration::from_millis(interval_ms);
        if timeout_ms == 0 {
            Self::forever(interval)
        } else {
            Self::bounded(interval, Duration::from_millis(timeout_ms))
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.interval;
        }

        #[allow(clippy::cast_possible_truncation)]
        let jitter_ms = self.jitter.as_millis() as u64;
        self.interval
            .saturating_add(Duration::from_millis(rand::random_range(0..=jitter_ms)))
    }
}

/// Repeatedly runs `check` until it yields a value or the policy's timeout
/// is exhausted.
///
/// `Ok(Some(value))` ends the wait. `Ok(None)` and `Err(_)` both mean "not
/// yet": errors are logged and retried, so an unreachable remote looks the
/// same as a condition that has not become true. On timeout the result is
/// `None` and the caller decides whether that is fatal.
///
/// The last sleep is clamped to the remaining budget, so a bounded wait
/// returns at most one check after `timeout`.
pub async fn wait_for<T, E, F, Fut>(
    policy: &PollPolicy,
    description: &str,
    mut check: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: Display,
{
    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        match check().await {
            Ok(Some(value)) => {
                info!("{description}: ready after {attempt} attempt(s)");
                return Some(value);
            }
            Ok(None) => debug!("{description}: not ready yet (attempt {attempt})"),
            Err(e) => warn!("{description}: check failed (attempt {attempt}), retrying: {e}"),
        }

        let delay = policy.next_delay();
        let delay = match policy.timeout {
            Some(timeout) => {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    warn!(
                        "{description}: gave up after {attempt} attempt(s) ({}s)",
                        elapsed.as_secs()
                    );
                    return None;
                }
                delay.min(timeout - elapsed)
            }
            None => delay,
        };

        sleep(delay).await;
    }
}
