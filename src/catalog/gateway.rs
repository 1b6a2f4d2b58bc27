// src/catalog/gateway.rs

//! Rate-limited request gateway
//!
//! Every outbound catalog call passes through one process-wide `Gateway`. It
//! enforces a minimum inter-request interval and retries throttling responses
//! with exponential backoff that is shared by all concurrent callers: once one
//! caller observes a 429, everyone waits out the same window.
//!
//! Two independent critical sections guard the shared state. The throttle
//! section spaces request dispatch; the backoff section tracks the failure
//! counter and the backoff deadline. A caller sleeping for a request slot
//! never holds the backoff lock, so concurrent failure bookkeeping is never
//! blocked behind a slot wait.

use crate::error::{Error, Result};
use rand::Rng;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Minimum spacing between dispatched requests (~4 req/s)
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(250);

/// Base delay for exponential backoff
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// Ceiling for any computed backoff delay
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_millis(30_000);

/// Maximum retry attempts after the initial request
const DEFAULT_MAX_RETRIES: u32 = 5;

/// Gateway tuning knobs
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub min_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub max_retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// How one attempt of a caller's request ended
///
/// The caller's closure performs the HTTP call and classifies the response;
/// the gateway only decides whether and when to retry.
pub enum RequestOutcome<T> {
    /// Usable response; resets the failure counter
    Success(T),

    /// HTTP 429; `retry_after` carries the server's hint when present
    RateLimited { retry_after: Option<Duration> },

    /// Transport-level failure (connect, timeout, decode)
    Transport(String),

    /// Definitive failure; returned to the caller as-is, never retried
    Failed(Error),
}

#[derive(Debug, Default)]
struct ThrottleState {
    last_request: Option<Instant>,
}

#[derive(Debug, Default)]
struct BackoffState {
    until: Option<Instant>,
    consecutive_failures: u32,
}

/// Serializes and throttles outbound catalog requests
///
/// One instance per catalog endpoint; see module docs.
pub struct Gateway {
    config: GatewayConfig,
    throttle: Mutex<ThrottleState>,
    backoff: Mutex<BackoffState>,
    cancel: CancellationToken,
}

impl Gateway {
    pub fn new(config: GatewayConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            throttle: Mutex::new(ThrottleState::default()),
            backoff: Mutex::new(BackoffState::default()),
            cancel,
        }
    }

    /// Run a request through the gateway, retrying throttled attempts
    ///
    /// The closure is invoked once per attempt. Cancellation aborts with
    /// `Error::Cancelled` at every suspension point: before dispatch, during
    /// the throttle and backoff waits, and while an attempt is in flight.
    /// Counters stay exactly as last committed.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RequestOutcome<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.wait_for_backoff().await?;
            self.acquire_slot().await?;

            let outcome = tokio::select! {
                outcome = op() => outcome,
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            };
            match outcome {
                RequestOutcome::Success(value) => {
                    self.backoff.lock().await.consecutive_failures = 0;
                    return Ok(value);
                }
                RequestOutcome::RateLimited { retry_after } => {
                    let failures = self.record_failure().await;
                    if attempt > self.config.max_retries {
                        warn!("Rate limited and retries exhausted after {} attempts", attempt);
                        return Err(Error::RateLimited { attempts: attempt });
                    }
                    let delay = retry_after.unwrap_or_else(|| self.backoff_delay(failures));
                    debug!(
                        "Rate limited (failure {}), backing off {}ms",
                        failures,
                        delay.as_millis()
                    );
                    self.extend_backoff(delay).await;
                }
                RequestOutcome::Transport(message) => {
                    let failures = self.record_failure().await;
                    if attempt > self.config.max_retries {
                        return Err(Error::api(format!(
                            "Request failed after {} attempts: {}",
                            attempt, message
                        )));
                    }
                    let delay = self.backoff_delay(failures);
                    warn!(
                        "Attempt {} failed: {}, retrying in {}ms",
                        attempt,
                        message,
                        delay.as_millis()
                    );
                    self.extend_backoff(delay).await;
                }
                RequestOutcome::Failed(err) => return Err(err),
            }
        }
    }

    /// Sleep out any active backoff window
    ///
    /// Loops because a concurrent caller may extend the deadline while we
    /// sleep.
    async fn wait_for_backoff(&self) -> Result<()> {
        loop {
            let until = self.backoff.lock().await.until;
            let Some(until) = until else { return Ok(()) };
            let now = Instant::now();
            if until <= now {
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep_until(until) => {}
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
    }

    /// Wait for a request slot and stamp the dispatch time
    ///
    /// The throttle lock is held across the spacing sleep: that is what
    /// serializes dispatch to one request per `min_interval`.
    async fn acquire_slot(&self) -> Result<()> {
        let mut throttle = self.throttle.lock().await;
        if let Some(last) = throttle.last_request {
            let ready_at = last + self.config.min_interval;
            if ready_at > Instant::now() {
                tokio::select! {
                    _ = tokio::time::sleep_until(ready_at) => {}
                    _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
        }
        throttle.last_request = Some(Instant::now());
        Ok(())
    }

    async fn record_failure(&self) -> u32 {
        let mut backoff = self.backoff.lock().await;
        backoff.consecutive_failures += 1;
        backoff.consecutive_failures
    }

    /// Extend the shared backoff window to `now + delay`
    ///
    /// A new deadline replaces the current one only if strictly later, so
    /// concurrent callers can never shorten an active window.
    async fn extend_backoff(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        let mut backoff = self.backoff.lock().await;
        if backoff.until.is_none_or(|current| deadline > current) {
            backoff.until = Some(deadline);
        }
    }

    /// Exponential backoff with jitter: `min(base * 2^(failures-1) + jitter, max)`
    ///
    /// Jitter is uniform over `[0, base/2]`.
    fn backoff_delay(&self, failures: u32) -> Duration {
        let base = self.config.backoff_base;
        let exponent = failures.saturating_sub(1).min(16);
        let scaled = base.saturating_mul(1u32 << exponent);
        let jitter_ceiling = (base / 2).as_millis() as u64;
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ceiling));
        (scaled + jitter).min(self.config.backoff_max)
    }

    /// Current consecutive-failure count (diagnostics and tests)
    pub async fn consecutive_failures(&self) -> u32 {
        self.backoff.lock().await.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_gateway() -> Gateway {
        Gateway::new(GatewayConfig::default(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_success_passes_value_through() {
        let gw = test_gateway();
        let out: Result<i32> = gw.execute(|| async { RequestOutcome::Success(42) }).await;
        assert_eq!(out.unwrap(), 42);
        assert_eq!(gw.consecutive_failures().await, 0);
    }

    #[tokio::test]
    async fn test_definitive_failure_is_not_retried() {
        let gw = test_gateway();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let out: Result<i32> = gw
            .execute(|| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    RequestOutcome::Failed(Error::NotFound)
                }
            })
            .await;
        assert!(matches!(out, Err(Error::NotFound)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_counter_monotonic_then_resets_on_success() {
        let gw = test_gateway();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let out: Result<i32> = gw
            .execute(|| {
                let counted = counted.clone();
                async move {
                    // Three throttled responses, then success
                    if counted.fetch_add(1, Ordering::SeqCst) < 3 {
                        RequestOutcome::RateLimited { retry_after: None }
                    } else {
                        RequestOutcome::Success(7)
                    }
                }
            })
            .await;
        assert_eq!(out.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(gw.consecutive_failures().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_fails_permanently() {
        let gw = test_gateway();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let out: Result<i32> = gw
            .execute(|| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    RequestOutcome::RateLimited { retry_after: None }
                }
            })
            .await;
        // Initial attempt plus max_retries, then permanent failure
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert!(matches!(out, Err(Error::RateLimited { attempts: 6 })));
        assert_eq!(gw.consecutive_failures().await, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_retry_hint_is_respected() {
        let gw = test_gateway();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let started = Instant::now();
        let out: Result<i32> = gw
            .execute(|| {
                let counted = counted.clone();
                async move {
                    if counted.fetch_add(1, Ordering::SeqCst) == 0 {
                        RequestOutcome::RateLimited {
                            retry_after: Some(Duration::from_secs(10)),
                        }
                    } else {
                        RequestOutcome::Success(1)
                    }
                }
            })
            .await;
        assert_eq!(out.unwrap(), 1);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sequence_increases_then_clamps() {
        let gw = test_gateway();
        let base = Duration::from_millis(1000);
        let jitter_max = base / 2;
        let mut previous = Duration::ZERO;
        for failures in 1..=6u32 {
            let delay = gw.backoff_delay(failures);
            let floor = base * 2u32.pow(failures - 1);
            assert!(delay <= Duration::from_millis(30_000), "delay over the cap");
            assert!(
                delay >= floor.min(Duration::from_millis(30_000)),
                "delay below the exponential floor"
            );
            assert!(delay <= (floor + jitter_max).min(Duration::from_millis(30_000)));
            assert!(delay >= previous.min(Duration::from_millis(30_000)));
            previous = delay;
        }
        // The sixth failure computes 32000ms before clamping
        assert_eq!(gw.backoff_delay(6), Duration::from_millis(30_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_deadline_never_shortens() {
        let gw = test_gateway();
        gw.extend_backoff(Duration::from_secs(20)).await;
        gw.extend_backoff(Duration::from_secs(1)).await;
        let until = gw.backoff.lock().await.until.unwrap();
        assert!(until >= Instant::now() + Duration::from_secs(19));
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_spacing_between_requests() {
        let gw = test_gateway();
        let started = Instant::now();
        for _ in 0..3 {
            let _: Result<()> = gw.execute(|| async { RequestOutcome::Success(()) }).await;
        }
        // Three requests: at least two full spacing gaps
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_cancelled_token_never_dispatches() {
        let cancel = CancellationToken::new();
        let gw = Gateway::new(GatewayConfig::default(), cancel.clone());
        cancel.cancel();

        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let out: Result<i32> = gw
            .execute(|| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    RequestOutcome::Success(1)
                }
            })
            .await;

        assert!(matches!(out, Err(Error::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_in_flight_attempt() {
        let cancel = CancellationToken::new();
        let gw = Gateway::new(GatewayConfig::default(), cancel.clone());
        let started = Instant::now();

        // The attempt would run for 30s; cancelling after 1s must cut it short
        let waiter = async {
            gw.execute(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                RequestOutcome::Success(1)
            })
            .await
        };
        let canceller = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        };
        let (out, _): (Result<i32>, _) = tokio::join!(waiter, canceller);

        assert!(matches!(out, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_backoff_wait() {
        let cancel = CancellationToken::new();
        let gw = Gateway::new(GatewayConfig::default(), cancel.clone());
        gw.extend_backoff(Duration::from_secs(30)).await;
        gw.record_failure().await;

        let waiter = async { gw.execute(|| async { RequestOutcome::Success(1) }).await };
        let canceller = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        };
        let (out, _) = tokio::join!(waiter, canceller);
        assert!(matches!(out, Err(Error::Cancelled)));
        // Counters untouched by the aborted wait
        assert_eq!(gw.consecutive_failures().await, 1);
    }
}
