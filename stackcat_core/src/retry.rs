/// Generic context-aware retry with pluggable backoff and predicate.
///
/// Mirrors the teacher's threadpool-based concurrency model (no async
/// runtime): cancellation is cooperative via a shared `CancellationToken`
/// that the sleep loop polls in short slices so a cancel request is
/// observed promptly without needing to interrupt a running attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;

#[derive(Debug)]
struct RetryError {
    inner: Context<RetryErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum RetryErrKind {
    #[fail(display = "context cancelled after attempt {}: {}", _0, _1)]
    Cancelled(u32, String),

    #[fail(display = "retry timeout exceeded after {} attempts", _0)]
    TimeoutExceeded(u32),

    #[fail(display = "max attempts ({}) exceeded", _0)]
    MaxAttemptsExceeded(u32),
}
use failure::{Error, Fail, Context, Backtrace};
use std::fmt::{self, Display};

impl Fail for RetryError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for RetryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<RetryErrKind> for RetryError {
    fn from(kind: RetryErrKind) -> RetryError {
        RetryError { inner: Context::new(kind) }
    }
}
impl From<Context<RetryErrKind>> for RetryError {
    fn from(inner: Context<RetryErrKind>) -> RetryError {
        RetryError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    Constant,
    Linear,
    Exponential,
}

/// Every field left unset means the corresponding limit is disabled, never
/// defaulted silently -- except `multiplier`, which defaults to `2.0` only
/// at the point of use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "duration_millis_opt")]
    pub max_elapsed: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "duration_millis_opt")]
    pub initial_delay: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "duration_millis_opt")]
    pub max_delay: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RetryStrategy>,
}

mod duration_millis_opt {
    use std::time::Duration;
    use serde::{Deserializer, Serializer, Deserialize};

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> std::result::Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Duration>, D::Error> {
        let millis: Option<u64> = Option::deserialize(d)?;
        Ok(millis.map(Duration::from_millis))
    }
}

impl RetryConfig {
    fn effective_multiplier(&self) -> f64 {
        self.multiplier.unwrap_or(2.0)
    }

    /// Computes the (uncapped, unjittered) delay for the given 1-indexed
    /// attempt number, per strategy.
    fn base_delay(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay.unwrap_or(Duration::from_millis(0));
        match self.strategy.unwrap_or(RetryStrategy::Exponential) {
            RetryStrategy::Constant => initial,
            RetryStrategy::Linear => initial * attempt,
            RetryStrategy::Exponential => {
                let factor = self.effective_multiplier().powi(attempt as i32 - 1);
                Duration::from_secs_f64(initial.as_secs_f64() * factor)
            }
        }
    }

    fn delay_for(&self, attempt: u32, jitter_sample: f64) -> Duration {
        let mut d = self.base_delay(attempt);
        if let Some(cap) = self.max_delay {
            if d > cap {
                d = cap;
            }
        }
        if let Some(j) = self.jitter {
            if j > 0.0 {
                // uniform +/- j*d, jitter_sample expected in [-1.0, 1.0]
                let delta = d.as_secs_f64() * j * jitter_sample;
                let secs = (d.as_secs_f64() + delta).max(0.0);
                d = Duration::from_secs_f64(secs);
            }
        }
        d
    }
}

/// Cooperative cancellation signal shared across a retry loop (and,
/// potentially, across the worker pool that owns it).
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

const SLEEP_SLICE: Duration = Duration::from_millis(20);

fn sleep_cancellable(d: Duration, token: &CancellationToken) -> bool {
    let deadline = Instant::now() + d;
    loop {
        if token.is_cancelled() {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(SLEEP_SLICE));
    }
}

/// Runs `f` under `cfg`, retrying on every `Err` (unconditionally). A `None`
/// config runs `f` exactly once with no retry.
pub fn execute<T, F>(cfg: Option<&RetryConfig>, token: &CancellationToken, mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    with_predicate(cfg, token, |_| true, f)
}

/// Like `execute`, but only retries when `should_retry(&err)` returns true;
/// a predicate returning false surfaces the error immediately regardless of
/// remaining budget.
pub fn with_predicate<T, F, P>(cfg: Option<&RetryConfig>, token: &CancellationToken, should_retry: P, mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
    P: Fn(&Error) -> bool,
{
    let cfg = match cfg {
        None => return f(),
        Some(c) => c,
    };

    let start = Instant::now();
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        if token.is_cancelled() {
            return Err(RetryErrKind::Cancelled(attempt - 1, "cancelled before attempt".to_string()))?;
        }

        match f() {
            Ok(v) => return Ok(v),
            Err(e) => {
                if !should_retry(&e) {
                    return Err(e);
                }
                if let Some(max) = cfg.max_attempts {
                    if attempt >= max {
                        return Err(RetryErrKind::MaxAttemptsExceeded(max))?;
                    }
                }
                if let Some(max_elapsed) = cfg.max_elapsed {
                    if start.elapsed() >= max_elapsed {
                        return Err(RetryErrKind::TimeoutExceeded(attempt))?;
                    }
                }

                let jitter_sample = rand::thread_rng().gen_range(-1.0..=1.0);
                let delay = cfg.delay_for(attempt, jitter_sample);
                if !sleep_cancellable(delay, token) {
                    return Err(RetryErrKind::Cancelled(attempt, e.to_string()))?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn no_config_runs_once() {
        let calls = Cell::new(0);
        let token = CancellationToken::new();
        let res: Result<()> = execute(None, &token, || {
            calls.set(calls.get() + 1);
            bail!("always fails")
        });
        assert!(res.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn max_attempts_budget() {
        let calls = Cell::new(0);
        let token = CancellationToken::new();
        let cfg = RetryConfig {
            max_attempts: Some(3),
            initial_delay: Some(Duration::from_millis(1)),
            strategy: Some(RetryStrategy::Constant),
            ..Default::default()
        };
        let res: Result<()> = execute(Some(&cfg), &token, || {
            calls.set(calls.get() + 1);
            bail!("always fails")
        });
        assert_eq!(calls.get(), 3);
        assert!(res.unwrap_err().to_string().contains("max attempts (3) exceeded"));
    }

    #[test]
    fn predicate_stops_retry_early() {
        let calls = Cell::new(0);
        let token = CancellationToken::new();
        let cfg = RetryConfig { max_attempts: Some(5), ..Default::default() };
        let res: Result<()> = with_predicate(Some(&cfg), &token, |_| false, || {
            calls.set(calls.get() + 1);
            bail!("non-retryable")
        });
        assert!(res.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn cancellation_stops_loop() {
        let token = CancellationToken::new();
        token.cancel();
        let cfg = RetryConfig { max_attempts: Some(5), ..Default::default() };
        let calls = Cell::new(0);
        let res: Result<()> = execute(Some(&cfg), &token, || {
            calls.set(calls.get() + 1);
            bail!("fails")
        });
        assert!(res.is_err());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn success_short_circuits() {
        let token = CancellationToken::new();
        let cfg = RetryConfig { max_attempts: Some(5), ..Default::default() };
        let calls = Cell::new(0);
        let res = execute(Some(&cfg), &token, || {
            calls.set(calls.get() + 1);
            if calls.get() < 2 { bail!("not yet") } else { Ok(42) }
        });
        assert_eq!(res.unwrap(), 42);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn delay_strategies() {
        let cfg = RetryConfig {
            initial_delay: Some(Duration::from_millis(10)),
            strategy: Some(RetryStrategy::Exponential),
            multiplier: Some(2.0),
            ..Default::default()
        };
        assert_eq!(cfg.base_delay(1), Duration::from_millis(10));
        assert_eq!(cfg.base_delay(2), Duration::from_millis(20));
        assert_eq!(cfg.base_delay(3), Duration::from_millis(40));
    }

    #[test]
    fn jitter_scales_delay_within_configured_bounds() {
        let cfg = RetryConfig {
            initial_delay: Some(Duration::from_millis(100)),
            strategy: Some(RetryStrategy::Constant),
            jitter: Some(0.5),
            ..Default::default()
        };
        let low = cfg.delay_for(1, -1.0);
        let high = cfg.delay_for(1, 1.0);
        assert_eq!(low, Duration::from_millis(50));
        assert_eq!(high, Duration::from_millis(150));
    }

    #[test]
    fn with_predicate_applies_randomized_jitter_without_panicking() {
        let calls = Cell::new(0);
        let token = CancellationToken::new();
        let cfg = RetryConfig {
            max_attempts: Some(2),
            initial_delay: Some(Duration::from_millis(1)),
            strategy: Some(RetryStrategy::Constant),
            jitter: Some(0.9),
            ..Default::default()
        };
        let res: Result<()> = execute(Some(&cfg), &token, || {
            calls.set(calls.get() + 1);
            bail!("always fails")
        });
        assert!(res.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn max_delay_caps() {
        let cfg = RetryConfig {
            initial_delay: Some(Duration::from_millis(10)),
            strategy: Some(RetryStrategy::Exponential),
            multiplier: Some(2.0),
            max_delay: Some(Duration::from_millis(25)),
            ..Default::default()
        };
        assert_eq!(cfg.delay_for(3, 0.0), Duration::from_millis(25));
    }
}
