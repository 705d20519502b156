//! HTTP fetching with user-agent rotation, exponential backoff and throttling.
//!
//! # Architecture
//!
//! The module uses a trait-based design so that the pipeline and the source
//! adapters never talk to `reqwest` directly:
//! - [`Fetch`]: core trait, one GET returning body bytes and status
//! - [`HttpFetcher`]: `reqwest` implementation that picks a user agent per request
//! - [`RetryFetch`]: decorator adding retries and a politeness delay to any [`Fetch`]
//!
//! # Retry Strategy
//!
//! - Every failure is transient: network errors, non-2xx statuses and
//!   undecodable API payloads
//! - At most 5 attempts, delay starting at 1 second and doubling, capped at 30 seconds
//! - Random jitter (0-250ms) added to each delay
//! - After a successful attempt a fixed 300ms pause caps the request rate

use rand::{Rng, rng};
use reqwest::header::USER_AGENT;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// Errors surfaced by a single fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("undecodable response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Per-request options.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub headers: Vec<(String, String)>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            headers: Vec::new(),
        }
    }
}

impl FetchOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: Vec<u8>,
    pub status: u16,
}

/// Trait for fetching a URL.
///
/// Implementors return the body of a 2xx response, or an error for anything else.
pub trait Fetch {
    async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<Fetched, FetchError>;
}

/// Backoff and throttle parameters for [`RetryFetch`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random delay added to each backoff.
    pub jitter: Duration,
    /// Pause after each successful page fetch.
    pub throttle: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
            throttle: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failure number `attempt` (1-based).
    ///
    /// ```text
    /// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
    /// ```
    pub fn backoff(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1u32 << shift).min(self.max_delay);
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter_ms: u64 = if jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=jitter_ms)
        };
        delay + Duration::from_millis(jitter_ms)
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` is reached.
///
/// The last error is returned once attempts are exhausted.
#[instrument(level = "debug", skip(policy, op))]
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let total_t0 = Instant::now();
    let mut attempt = 0usize;

    loop {
        let attempt_t0 = Instant::now();
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                let attempt_dt = attempt_t0.elapsed();
                let total_dt = total_t0.elapsed();

                if attempt >= policy.max_attempts {
                    error!(
                        attempt,
                        max = policy.max_attempts,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        error = %e,
                        "{label} exhausted retries"
                    );
                    return Err(e);
                }

                let delay = policy.backoff(attempt);
                warn!(
                    attempt,
                    max = policy.max_attempts,
                    elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                    ?delay,
                    error = %e,
                    "{label} attempt failed; backing off"
                );
                sleep(delay).await;
            }
        }
    }
}

/// `reqwest`-backed fetcher rotating through a pool of user agents.
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agents: Vec<String>,
}

impl HttpFetcher {
    pub fn new(user_agents: Vec<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            client,
            user_agents,
        })
    }

    fn pick_user_agent(&self) -> Option<&str> {
        if self.user_agents.is_empty() {
            return None;
        }
        let idx = rng().random_range(0..self.user_agents.len());
        Some(self.user_agents[idx].as_str())
    }
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("user_agents", &self.user_agents.len())
            .finish()
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<Fetched, FetchError> {
        let mut req = self.client.get(url).timeout(opts.timeout);
        // An explicit User-Agent from the caller replaces the rotating pool.
        let caller_ua = opts
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(USER_AGENT.as_str()));
        if !caller_ua {
            if let Some(ua) = self.pick_user_agent() {
                req = req.header(USER_AGENT, ua);
            }
        }
        for (name, value) in &opts.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = resp.bytes().await?.to_vec();
        debug!(status = status.as_u16(), bytes = body.len(), "Fetched");
        Ok(Fetched {
            body,
            status: status.as_u16(),
        })
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetch`] implementation.
pub struct RetryFetch<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Fetch> RetryFetch<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Fetch and decode a JSON document, retrying decode failures like
    /// network failures. No politeness delay is applied.
    pub async fn fetch_json<J: DeserializeOwned>(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<J, FetchError> {
        retry_with_backoff(&self.policy, "fetch_json", move || async move {
            let fetched = self.inner.fetch(url, opts).await?;
            serde_json::from_slice::<J>(&fetched.body).map_err(|e| FetchError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            })
        })
        .await
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T: Fetch> Fetch for RetryFetch<T> {
    async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<Fetched, FetchError> {
        let fetched =
            retry_with_backoff(&self.policy, "fetch", move || self.inner.fetch(url, opts)).await?;
        if !self.policy.throttle.is_zero() {
            sleep(self.policy.throttle).await;
        }
        Ok(fetched)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted [`Fetch`] implementations shared by tests across the crate.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies per URL. URLs listed in `failing` always error,
    /// URLs in `flaky` fail the given number of times before succeeding.
    #[derive(Default)]
    pub struct ScriptedFetcher {
        pages: HashMap<String, Vec<u8>>,
        failing: Vec<String>,
        flaky: Mutex<HashMap<String, usize>>,
        calls: Mutex<Vec<String>>,
        pub seen_headers: Mutex<Vec<Vec<(String, String)>>>,
    }

    impl ScriptedFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
            self.pages.insert(url.to_string(), body.into());
            self
        }

        pub fn failing(mut self, url: &str) -> Self {
            self.failing.push(url.to_string());
            self
        }

        pub fn flaky(self, url: &str, failures: usize) -> Self {
            self.flaky
                .lock()
                .unwrap()
                .insert(url.to_string(), failures);
            self
        }

        pub fn calls_for(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Fetch for ScriptedFetcher {
        async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<Fetched, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.seen_headers.lock().unwrap().push(opts.headers.clone());

            if self.failing.iter().any(|f| f == url) {
                return Err(FetchError::Status {
                    status: 503,
                    url: url.to_string(),
                });
            }
            {
                let mut flaky = self.flaky.lock().unwrap();
                if let Some(left) = flaky.get_mut(url) {
                    if *left > 0 {
                        *left -= 1;
                        return Err(FetchError::Status {
                            status: 502,
                            url: url.to_string(),
                        });
                    }
                }
            }
            match self.pages.get(url) {
                Some(body) => Ok(Fetched {
                    body: body.clone(),
                    status: 200,
                }),
                None => Err(FetchError::Status {
                    status: 404,
                    url: url.to_string(),
                }),
            }
        }
    }

    /// A policy with no waiting, for tests.
    pub fn instant_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
            throttle: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(5), Duration::from_secs(16));
        assert_eq!(policy.backoff(6), Duration::from_secs(30));
        assert_eq!(policy.backoff(40), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_jitter_bounded() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.backoff(1);
            assert!(d >= Duration::from_secs(1));
            assert!(d <= Duration::from_millis(1250));
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let inner = ScriptedFetcher::new()
            .page("https://a.test/", "ok")
            .flaky("https://a.test/", 3);
        let fetcher = RetryFetch::new(inner, instant_policy());

        let got = fetcher
            .fetch("https://a.test/", &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(got.body, b"ok");
        assert_eq!(got.status, 200);
        assert_eq!(fetcher.inner.calls_for("https://a.test/"), 4);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_five_attempts() {
        let inner = ScriptedFetcher::new().failing("https://down.test/");
        let fetcher = RetryFetch::new(inner, instant_policy());

        let err = fetcher
            .fetch("https://down.test/", &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert_eq!(fetcher.inner.calls_for("https://down.test/"), 5);
    }

    #[tokio::test]
    async fn test_throttle_applied_after_success() {
        let inner = ScriptedFetcher::new().page("https://a.test/", "ok");
        let policy = RetryPolicy {
            throttle: Duration::from_millis(40),
            ..instant_policy()
        };
        let fetcher = RetryFetch::new(inner, policy);

        let t0 = Instant::now();
        fetcher
            .fetch("https://a.test/", &FetchOptions::default())
            .await
            .unwrap();
        assert!(t0.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_fetch_json_retries_malformed_payload() {
        // First body is garbage, so every attempt fails to decode.
        let inner = ScriptedFetcher::new().page("https://api.test/", "{not json");
        let fetcher = RetryFetch::new(inner, instant_policy());

        let err = fetcher
            .fetch_json::<Value>("https://api.test/", &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
        assert_eq!(fetcher.inner.calls_for("https://api.test/"), 5);
    }

    #[tokio::test]
    async fn test_fetch_json_decodes() {
        let inner = ScriptedFetcher::new().page("https://api.test/", r#"{"n": 3}"#);
        let fetcher = RetryFetch::new(inner, instant_policy());

        let v: Value = fetcher
            .fetch_json("https://api.test/", &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(v["n"], 3);
    }

    #[test]
    fn test_fetch_options_headers() {
        let opts = FetchOptions::with_timeout(Duration::from_secs(30)).header("X-Api-Key", "k");
        assert_eq!(opts.timeout, Duration::from_secs(30));
        assert_eq!(opts.headers, vec![("X-Api-Key".to_string(), "k".to_string())]);
    }

    #[test]
    fn test_http_fetcher_empty_pool_sends_no_agent() {
        let fetcher = HttpFetcher::new(Vec::new()).unwrap();
        assert!(fetcher.pick_user_agent().is_none());

        let fetcher = HttpFetcher::new(vec!["UA-1".to_string()]).unwrap();
        assert_eq!(fetcher.pick_user_agent(), Some("UA-1"));
    }
}
