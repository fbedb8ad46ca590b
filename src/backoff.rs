//! Bounded retry with exponential backoff for a single generation request.
//!
//! Attempts are strictly sequential: attempt `n + 1` starts only after attempt `n`
//! failed and was classified. Every request gets a fresh [`RetryState`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Statuses worth another attempt: provider throttling and overload.
pub const RETRYABLE_STATUSES: [u16; 2] = [429, 503];

/// Retry schedule: `max_attempts` total calls, waiting `base_delay * 2^n` after the
/// n-th failed attempt. No jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// Decides whether a failure on the 0-based `attempt` deserves another try.
    ///
    /// ```
    /// use selfui::backoff::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert!(policy.should_retry(Some(429), 0));
    /// assert!(policy.should_retry(Some(503), 1));
    /// assert!(!policy.should_retry(Some(429), 2));
    /// assert!(!policy.should_retry(Some(400), 0));
    /// assert!(!policy.should_retry(None, 0));
    /// ```
    pub fn should_retry(&self, status: Option<u16>, attempt: u32) -> bool {
        let retryable = status.is_some_and(|code| RETRYABLE_STATUSES.contains(&code));
        retryable && attempt.saturating_add(1) < self.max_attempts
    }

    /// Delay to wait after the failed 0-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Position of one request in the retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// About to issue the 0-based attempt.
    Attempting(u32),
    Succeeded,
    Failed,
}

/// Per-request retry bookkeeping.
#[derive(Debug)]
pub struct RetryState {
    state: AttemptState,
    attempts: u32,
    last_error: Option<ProviderError>,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            state: AttemptState::Attempting(0),
            attempts: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Number of provider calls issued so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&ProviderError> {
        self.last_error.as_ref()
    }

    fn begin_attempt(&mut self) {
        self.attempts += 1;
    }

    pub fn on_success(&mut self) {
        self.state = AttemptState::Succeeded;
    }

    /// Records a failed attempt and returns the delay before the next one, or `None`
    /// when the request is now [`AttemptState::Failed`].
    pub fn on_failure(&mut self, policy: &RetryPolicy, err: ProviderError) -> Option<Duration> {
        let status = err.status();
        self.last_error = Some(err);
        match self.state {
            AttemptState::Attempting(n) if policy.should_retry(status, n) => {
                self.state = AttemptState::Attempting(n + 1);
                Some(policy.delay_for(n))
            }
            _ => {
                self.state = AttemptState::Failed;
                None
            }
        }
    }

    fn abort(&mut self) {
        self.last_error = Some(cancelled());
        self.state = AttemptState::Failed;
    }

    fn exhausted(&mut self, policy: &RetryPolicy) -> bool {
        if let AttemptState::Attempting(n) = self.state {
            if n >= policy.max_attempts {
                self.state = AttemptState::Failed;
                return true;
            }
        }
        false
    }
}

/// Terminal failure of the retry loop.
///
/// `last_error` is `None` only when no attempt ran at all.
#[derive(Debug)]
pub struct RetryFailure {
    pub attempts: u32,
    pub last_error: Option<ProviderError>,
}

/// Non-blocking delay between attempts; tests substitute a recording fake.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

fn cancelled() -> ProviderError {
    ProviderError::Aborted {
        message: "generation cancelled by caller".to_string(),
    }
}

/// Drives `op` through the retry state machine.
///
/// `op` receives the 0-based attempt index. Cancellation is observed before each
/// attempt, while a call is in flight, and during the backoff delay.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut retry = RetryState::new();

    while let AttemptState::Attempting(attempt) = retry.state() {
        if retry.exhausted(policy) {
            break;
        }
        if cancel.is_cancelled() {
            retry.abort();
            break;
        }

        retry.begin_attempt();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled()),
            result = op(attempt) => result,
        };

        let err = match outcome {
            Ok(value) => {
                retry.on_success();
                if attempt > 0 {
                    debug!(attempts = retry.attempts(), "provider call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let status = err.status();
        let retry_after = match &err {
            ProviderError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        };
        let message = err.message().to_string();
        if let Some(delay) = retry.on_failure(policy, err) {
            warn!(
                attempt = attempt + 1,
                status,
                delay_ms = delay.as_millis() as u64,
                retry_after_secs = retry_after.map(|d| d.as_secs()),
                error = %message,
                "provider call failed, retrying"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => retry.abort(),
                _ = sleeper.sleep(delay) => {}
            }
        }
    }

    Err(RetryFailure {
        attempts: retry.attempts(),
        last_error: retry.last_error,
    })
}
