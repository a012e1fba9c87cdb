// src/services/retry.rs

//! Bounded retry policy and the single-attempt fetch it wraps.

use std::time::Duration;

use crate::error::{FetchError, FetchErrorKind, PageError};
use crate::models::RetryConfig;
use crate::services::session::{Page, Session, classify};
use crate::services::throttle::Throttle;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again
    RetryAfter(Duration),
    /// Hand the block to the throttle, then try again
    EscalateBlocked,
    /// Hand the block to the throttle, then stop trying
    GiveUpBlocked,
    /// Stop trying
    GiveUp,
}

/// Attempt budget with exponential, capped backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Delay after the `failures`-th failed attempt (1-based).
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Decide after `attempt` attempts have been made and the last one failed.
    ///
    /// A block always reaches the throttle, including on the last attempt.
    pub fn decide(&self, attempt: u32, error: &FetchError) -> RetryDecision {
        if !error.kind.is_transient() {
            return RetryDecision::GiveUp;
        }
        let exhausted = attempt >= self.max_attempts;
        match error.kind {
            FetchErrorKind::Blocked if exhausted => RetryDecision::GiveUpBlocked,
            FetchErrorKind::Blocked => RetryDecision::EscalateBlocked,
            _ if exhausted => RetryDecision::GiveUp,
            _ => RetryDecision::RetryAfter(self.backoff(attempt)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// One paced request: throttle, open, classify, parse.
pub async fn fetch_once<T>(
    session: &mut dyn Session,
    throttle: &mut Throttle,
    url: &str,
    parse: impl FnOnce(Page) -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let identity = throttle.before_request().await;
    let page = session.open(url, &identity).await?;
    let value = parse(classify(page)?)?;
    throttle.on_success();
    Ok(value)
}

/// Fetch a listing or index page under `policy`.
pub async fn fetch_page_with_retry<T>(
    policy: &RetryPolicy,
    session: &mut dyn Session,
    throttle: &mut Throttle,
    url: &str,
    parse: impl Fn(Page) -> Result<T, FetchError>,
) -> Result<T, PageError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match fetch_once(session, throttle, url, &parse).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        match policy.decide(attempt, &error) {
            decision @ (RetryDecision::GiveUp | RetryDecision::GiveUpBlocked) => {
                if decision == RetryDecision::GiveUpBlocked {
                    throttle.on_blocked().await;
                }
                return Err(PageError {
                    url: url.to_string(),
                    attempts: attempt,
                    source: error,
                });
            }
            RetryDecision::EscalateBlocked => {
                log::warn!("Page {} blocked (attempt {}/{})", url, attempt, policy.max_attempts);
                throttle.on_blocked().await;
            }
            RetryDecision::RetryAfter(delay) => {
                log::warn!(
                    "Page {} failed (attempt {}/{}): {}; retrying in {:?}",
                    url,
                    attempt,
                    policy.max_attempts,
                    error,
                    delay
                );
                throttle.pause(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThrottleConfig;
    use crate::services::session::MemorySession;
    use crate::services::throttle::InstantSleeper;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(3))
    }

    fn throttle() -> Throttle {
        let config = ThrottleConfig {
            min_delay_ms: 0,
            max_delay_ms: 0,
            seed: Some(1),
            ..ThrottleConfig::default()
        };
        Throttle::new(config, Box::new(InstantSleeper::new()))
    }

    #[test]
    fn test_backoff_schedule() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(3), Duration::from_secs(3));
        assert_eq!(p.backoff(40), Duration::from_secs(3));
    }

    #[test]
    fn test_decisions_by_kind() {
        let p = policy();
        let url = "https://example.com";
        assert_eq!(
            p.decide(1, &FetchError::timeout(url, "t")),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            p.decide(2, &FetchError::network(url, "n")),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(
            p.decide(1, &FetchError::blocked(url, "b")),
            RetryDecision::EscalateBlocked
        );
        assert_eq!(
            p.decide(1, &FetchError::malformed(url, "m")),
            RetryDecision::GiveUp
        );
        assert_eq!(
            p.decide(3, &FetchError::timeout(url, "t")),
            RetryDecision::GiveUp
        );
        assert_eq!(
            p.decide(3, &FetchError::blocked(url, "b")),
            RetryDecision::GiveUpBlocked
        );
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_page_retry_recovers() {
        let url = "https://example.com/vol/1";
        let mut session = MemorySession::new().status(url, 503).page(url, "<p>ok</p>");
        let mut throttle = throttle();

        let html = fetch_page_with_retry(&policy(), &mut session, &mut throttle, url, |p| Ok(p.html))
            .await
            .unwrap();
        assert_eq!(html, "<p>ok</p>");
        assert_eq!(session.visit_count(url), 2);
    }

    #[tokio::test]
    async fn test_page_retry_exhausts_on_blocks() {
        let url = "https://example.com/vol/1";
        let mut session = MemorySession::new().status(url, 403);
        let sleeper = InstantSleeper::new();
        let config = ThrottleConfig {
            min_delay_ms: 0,
            max_delay_ms: 0,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
            seed: Some(1),
            ..ThrottleConfig::default()
        };
        let mut throttle = Throttle::new(config, Box::new(sleeper.clone()));

        let err = fetch_page_with_retry(&policy(), &mut session, &mut throttle, url, |p| Ok(p.html))
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.source.kind, FetchErrorKind::Blocked);
        // Every block escalates, the last one included.
        assert_eq!(throttle.backoff_level(), 3);
        let backoffs: Vec<Duration> = sleeper
            .recorded()
            .into_iter()
            .filter(|d| !d.is_zero())
            .collect();
        assert_eq!(
            backoffs,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }
}
