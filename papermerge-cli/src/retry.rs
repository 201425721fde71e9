use std::future::Future;
use std::time::Duration;

use papermerge_core::PapermergeError;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::{EnvLookup, read_bool, read_u64};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_BASE_MS: u64 = 500;
const DEFAULT_MAX_MS: u64 = 30_000;

pub const RETRY_MAX_ATTEMPTS_ENV: &str = "PAPERMERGE_CLI__RETRY_MAX_ATTEMPTS";
pub const RETRY_BASE_MS_ENV: &str = "PAPERMERGE_CLI__RETRY_BASE_MS";
pub const RETRY_MAX_MS_ENV: &str = "PAPERMERGE_CLI__RETRY_MAX_MS";
pub const RETRY_JITTER_ENV: &str = "PAPERMERGE_CLI__RETRY_JITTER";

/// Delay between attempts: `base` doubled per retry and capped at `max`.
/// With jitter the delay is a uniform fraction of that ceiling.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self { base, max, jitter }
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Upper bound of the delay before retry number `retry` (zero based).
    pub fn ceiling(&self, retry: u32) -> Duration {
        self.base.saturating_mul(1 << retry.min(16)).min(self.max)
    }

    pub fn delay(&self, retry: u32) -> Duration {
        self.delay_with_rng(retry, &mut rand::thread_rng())
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, retry: u32, rng: &mut R) -> Duration {
        let ceiling = self.ceiling(retry);
        if self.jitter {
            ceiling.mul_f64(rng.gen_range(0.0..=1.0))
        } else {
            ceiling
        }
    }
}

/// Give-up condition plus backoff schedule applied to remote mutations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::new(
                Duration::from_millis(DEFAULT_BASE_MS),
                Duration::from_millis(DEFAULT_MAX_MS),
                false,
            ),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Reads `PAPERMERGE_CLI__RETRY_*` overrides; unset or invalid values keep defaults.
    pub fn from_env(lookup: EnvLookup<'_>) -> Self {
        let max_attempts = read_u64(lookup, RETRY_MAX_ATTEMPTS_ENV, DEFAULT_MAX_ATTEMPTS.into());
        let max_attempts = u32::try_from(max_attempts).unwrap_or(u32::MAX);
        let base = read_u64(lookup, RETRY_BASE_MS_ENV, DEFAULT_BASE_MS);
        let max = read_u64(lookup, RETRY_MAX_MS_ENV, DEFAULT_MAX_MS).max(base);
        let jitter = read_bool(lookup, RETRY_JITTER_ENV, false);
        Self::new(
            max_attempts,
            Backoff::new(Duration::from_millis(base), Duration::from_millis(max), jitter),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1`, honoring a server supplied
    /// `Retry-After` without exceeding the backoff cap.
    fn delay_after(&self, attempt: u32, err: &PapermergeError) -> Duration {
        match err.retry_after() {
            Some(hint) => hint.min(self.backoff.max()),
            None => self.backoff.delay(attempt.saturating_sub(1)),
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, runs out
    /// of attempts, or `cancel` fires while waiting between attempts.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, PapermergeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PapermergeError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => {
                    tracing::debug!(%label, attempt, error = %err, "giving up without retry");
                    return Err(err);
                }
                Err(err) if attempt >= self.max_attempts => {
                    tracing::warn!(%label, attempt, error = %err, "retries exhausted");
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay_after(attempt, &err);
                    tracing::warn!(
                        %label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(err),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use papermerge_core::{PapermergeClient, StatusCode};
    use uuid::Uuid;

    fn status(code: u16) -> PapermergeError {
        PapermergeError::Api {
            status: StatusCode::from_u16(code).unwrap(),
            body: String::new(),
            retry_after: None,
        }
    }

    fn instant_policy() -> RetryPolicy {
        RetryPolicy::new(
            DEFAULT_MAX_ATTEMPTS,
            Backoff::new(Duration::ZERO, Duration::ZERO, false),
        )
    }

    #[test]
    fn default_schedule_doubles_from_half_a_second_up_to_thirty() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..DEFAULT_MAX_ATTEMPTS)
            .map(|attempt| policy.delay_after(attempt, &status(503)).as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![500, 1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000, 30_000]
        );
    }

    #[test]
    fn doubling_stops_growing_past_sixteen_retries() {
        let backoff = Backoff::new(Duration::from_nanos(1), Duration::MAX, false);
        assert_eq!(backoff.ceiling(16), Duration::from_nanos(1 << 16));
        assert_eq!(backoff.ceiling(u32::MAX), Duration::from_nanos(1 << 16));
    }

    #[test]
    fn jitter_stays_under_the_ceiling_and_varies() {
        let backoff = Backoff::new(
            Duration::from_millis(DEFAULT_BASE_MS),
            Duration::from_millis(DEFAULT_MAX_MS),
            true,
        );
        let mut rng = StdRng::seed_from_u64(7);
        let delays: Vec<Duration> = (0..32)
            .map(|_| backoff.delay_with_rng(9, &mut rng))
            .collect();

        let ceiling = Duration::from_millis(DEFAULT_MAX_MS);
        assert!(delays.iter().all(|delay| *delay <= ceiling));
        assert!(delays.iter().any(|delay| *delay < ceiling / 2));
        assert!(delays.iter().any(|delay| *delay > ceiling / 2));
    }

    #[test]
    fn retry_after_hint_is_capped() {
        let policy = RetryPolicy::new(
            3,
            Backoff::new(Duration::from_millis(10), Duration::from_secs(2), false),
        );
        let err = PapermergeError::Api {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
            retry_after: Some(Duration::from_secs(60)),
        };
        assert_eq!(policy.delay_after(1, &err), Duration::from_secs(2));
        assert_eq!(
            policy.delay_after(2, &status(502)),
            Duration::from_millis(20)
        );
    }

    #[tokio::test]
    async fn server_errors_use_every_attempt() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = instant_policy()
            .run("create folder", &CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(status(502))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn refused_connections_use_every_attempt() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let client = &PapermergeClient::new(&host, "test-token").unwrap();

        let calls = &AtomicU32::new(0);
        let err = instant_policy()
            .run("create folder", &CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                client.create_folder(Uuid::from_u128(1), "invoices").await
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PapermergeError::Request(_)));
        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = instant_policy()
            .run("create folder", &CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(status(409))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = instant_policy()
            .run("upload", &CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(status(401))
            })
            .await;

        assert!(result.unwrap_err().is_auth());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let value = instant_policy()
            .run("upload", &CancellationToken::new(), move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(status(500))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff_sleep() {
        let policy = RetryPolicy::new(
            DEFAULT_MAX_ATTEMPTS,
            Backoff::new(Duration::from_secs(3600), Duration::from_secs(3600), false),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = policy
            .run("upload", &cancel, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(status(503))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn from_env_reads_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (RETRY_MAX_ATTEMPTS_ENV, "4"),
            (RETRY_BASE_MS_ENV, "not-a-number"),
        ]);
        let lookup = |name: &str| vars.get(name).map(|v| v.to_string());
        let policy = RetryPolicy::from_env(&lookup);

        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_after(1, &status(500)), Duration::from_millis(500));
    }
}
