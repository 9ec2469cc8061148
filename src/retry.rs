use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use rand::Rng;
use crate::error::{ErrorKind, FetchError, Result};
use crate::output::Logger;

/// Outcome of classifying a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    Retryable,
    Terminal,
}

/// Custom error classification installed on a policy.
pub type Classifier = Arc<dyn Fn(&FetchError) -> Retryability + Send + Sync>;

/// Bounded retry with exponential backoff and additive jitter.
///
/// The `k`-th retry (0-based) waits `base_delay * factor^k` plus a uniform
/// random offset in `[0, jitter)`. At most `max_retries + 1` attempts run.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub jitter: Duration,
    /// Statuses retried in addition to 5xx, e.g. 429.
    pub retry_statuses: Vec<u16>,
    classifier: Option<Classifier>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("factor", &self.factor)
            .field("jitter", &self.jitter)
            .field("retry_statuses", &self.retry_statuses)
            .field("custom_classifier", &self.classifier.is_some())
            .finish()
    }
}

impl RetryPolicy {
    /// Create a new retry policy with default values
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            jitter: Duration::ZERO,
            retry_statuses: Vec::new(),
            classifier: None,
        }
    }

    /// Create a retry policy with custom values, rejecting out-of-range ones
    pub fn with_params(max_retries: u32, base_delay: Duration, factor: f64, jitter: Duration) -> Result<Self> {
        let policy = Self {
            max_retries,
            base_delay,
            factor,
            jitter,
            ..Self::new()
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn with_retry_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.retry_statuses = statuses;
        self
    }

    /// Replace the default classification.
    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&FetchError) -> Retryability + Send + Sync + 'static,
    {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.factor.is_finite() || self.factor <= 1.0 {
            return Err(FetchError::config(format!(
                "backoff factor must be greater than 1, got {}",
                self.factor
            )));
        }
        Ok(())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Deterministic part of the delay before retry `retry_index`.
    pub fn backoff(&self, retry_index: u32) -> Duration {
        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
        let nanos = self.base_delay.as_nanos() as f64 * self.factor.powi(exponent);
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return Duration::from_nanos(u64::MAX);
        }
        Duration::from_nanos(nanos as u64)
    }

    /// Delay before retry `retry_index`, jitter included.
    pub fn next_delay(&self, retry_index: u32) -> Duration {
        let delay = self.backoff(retry_index);
        let jitter_nanos = u64::try_from(self.jitter.as_nanos()).unwrap_or(u64::MAX);
        if jitter_nanos == 0 {
            return delay;
        }
        let offset = rand::thread_rng().gen_range(0..jitter_nanos);
        delay.saturating_add(Duration::from_nanos(offset))
    }

    pub fn classify(&self, error: &FetchError) -> Retryability {
        match &self.classifier {
            Some(classifier) => classifier(error),
            None => default_classify(error, &self.retry_statuses),
        }
    }

    /// Run `op` until it succeeds, fails terminally, or the budget is spent.
    pub fn run<T, F>(&self, target: &str, logger: &Logger, op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        self.run_with_sleeper(target, logger, op, thread::sleep)
    }

    /// Same as [`run`](Self::run) with a caller-supplied sleep.
    pub fn run_with_sleeper<T, F, S>(&self, target: &str, logger: &Logger, mut op: F, mut sleep: S) -> Result<T>
    where
        F: FnMut() -> Result<T>,
        S: FnMut(Duration),
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match op() {
                Ok(value) => {
                    if attempt > 1 {
                        logger.debug(&format!("{} succeeded on attempt {}", target, attempt));
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if self.max_retries == 0 {
                return Err(err);
            }
            if self.classify(&err) == Retryability::Terminal {
                logger.debug(&format!("{} failed with a terminal error, not retrying", target));
                return Err(err);
            }
            if attempt >= max_attempts {
                logger.retries_exhausted(target, attempt);
                return Err(FetchError::retry_exhausted(target, attempt, err));
            }

            let delay = self.next_delay(attempt - 1);
            logger.retry_attempt(target, attempt, max_attempts, delay, &err);
            sleep(delay);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport failures and timeouts are retried, so are 5xx statuses and any
/// status listed in `extra_statuses`. Wrapped errors are judged by their cause.
pub fn default_classify(error: &FetchError, extra_statuses: &[u16]) -> Retryability {
    match error.root_cause().kind {
        ErrorKind::Connection | ErrorKind::Timeout => Retryability::Retryable,
        ErrorKind::HttpStatus(status) if (500..600).contains(&status) || extra_statuses.contains(&status) => {
            Retryability::Retryable
        }
        _ => Retryability::Terminal,
    }
}
