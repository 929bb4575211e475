use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::USER_AGENT;
use crate::error::{FetchError, Result};

/// Statuses worth another attempt. Everything else non-2xx is permanent.
pub const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// `GET(url, params) -> (status, body) | transport error`, already timeout-bounded.
#[async_trait]
pub trait HttpGet: Send + Sync {
    async fn get(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<HttpResponse, FetchError>;
}

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpGet for ReqwestHttp {
    async fn get(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<HttpResponse, FetchError> {
        let resp = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// Retry state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// One attempt's result, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    Retryable(String),
    Permanent(FetchError),
}

pub fn classify(
    url: &str,
    result: std::result::Result<HttpResponse, FetchError>,
) -> Outcome {
    match result {
        Ok(resp) if (200..300).contains(&resp.status) => Outcome::Success(resp.body),
        Ok(resp) if RETRYABLE_STATUSES.contains(&resp.status) => {
            Outcome::Retryable(format!("HTTP {}", resp.status))
        }
        Ok(resp) => Outcome::Permanent(FetchError::Status {
            status: resp.status,
            url: url.to_string(),
        }),
        Err(FetchError::Transport(e)) => Outcome::Retryable(e),
        Err(other) => Outcome::Permanent(other),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Done(String),
    Wait(Duration),
    GiveUp(FetchError),
}

/// Attempt counter plus the delay to use before the next retry.
/// Delay starts at `base_delay` and doubles up to `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    url: String,
    attempts: u32,
    next_delay: Duration,
}

impl RetryState {
    pub fn new(policy: RetryPolicy, url: &str) -> Self {
        let next_delay = policy.base_delay.min(policy.max_delay);
        Self { policy, url: url.to_string(), attempts: 0, next_delay }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn on_outcome(&mut self, outcome: Outcome) -> Step {
        self.attempts += 1;
        match outcome {
            Outcome::Success(body) => Step::Done(body),
            Outcome::Permanent(err) => Step::GiveUp(err),
            Outcome::Retryable(reason) if self.attempts >= self.policy.max_attempts => {
                Step::GiveUp(FetchError::Exhausted {
                    url: self.url.clone(),
                    attempts: self.attempts,
                    last: reason,
                })
            }
            Outcome::Retryable(_) => {
                let wait = self.next_delay;
                self.next_delay = (self.next_delay * 2).min(self.policy.max_delay);
                Step::Wait(wait)
            }
        }
    }
}

/// Fetch `url`, retrying transient failures. Callers only see the final body
/// or the final error.
pub async fn fetch_with_retry(
    http: &dyn HttpGet,
    sleeper: &dyn Sleeper,
    policy: &RetryPolicy,
    url: &str,
) -> std::result::Result<String, FetchError> {
    let mut state = RetryState::new(policy.clone(), url);
    loop {
        let outcome = classify(url, http.get(url, &[]).await);
        match state.on_outcome(outcome) {
            Step::Done(body) => return Ok(body),
            Step::Wait(delay) => {
                debug!(
                    url,
                    attempt = state.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "transient fetch failure, backing off"
                );
                sleeper.sleep(delay).await;
            }
            Step::GiveUp(err) => {
                warn!(url, attempts = state.attempts(), "fetch failed: {err}");
                return Err(err);
            }
        }
    }
}

/// Shared handle used by the scrape-based providers.
#[derive(Clone)]
pub struct PageFetcher {
    http: Arc<dyn HttpGet>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl PageFetcher {
    pub fn new(http: Arc<dyn HttpGet>, sleeper: Arc<dyn Sleeper>, policy: RetryPolicy) -> Self {
        Self { http, sleeper, policy }
    }

    pub async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        fetch_with_retry(self.http.as_ref(), self.sleeper.as_ref(), &self.policy, url).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{ok, status, transport_err, RecordingSleeper, ScriptedHttp};

    fn secs(v: &[u64]) -> Vec<Duration> {
        v.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    #[tokio::test]
    async fn success_on_first_attempt_does_not_sleep() {
        let http = ScriptedHttp::new(vec![ok("<html>hi</html>")]);
        let sleeper = RecordingSleeper::default();
        let body = fetch_with_retry(&http, &sleeper, &RetryPolicy::default(), "http://x/a")
            .await
            .unwrap();
        assert_eq!(body, "<html>hi</html>");
        assert_eq!(http.calls(), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn transient_statuses_are_retried_with_doubling_backoff() {
        let http = ScriptedHttp::new(vec![status(503), status(429), ok("body")]);
        let sleeper = RecordingSleeper::default();
        let body = fetch_with_retry(&http, &sleeper, &RetryPolicy::default(), "http://x/a")
            .await
            .unwrap();
        assert_eq!(body, "body");
        assert_eq!(http.calls(), 3);
        assert_eq!(sleeper.slept(), secs(&[5, 10]));
    }

    #[tokio::test]
    async fn permanent_status_is_not_retried() {
        let http = ScriptedHttp::new(vec![status(404), ok("never")]);
        let sleeper = RecordingSleeper::default();
        let err = fetch_with_retry(&http, &sleeper, &RetryPolicy::default(), "http://x/a")
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Status { status: 404, url: "http://x/a".to_string() });
        assert_eq!(http.calls(), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let http = ScriptedHttp::new(vec![transport_err("reset"), status(502), status(500), ok("late")]);
        let sleeper = RecordingSleeper::default();
        let err = fetch_with_retry(&http, &sleeper, &RetryPolicy::default(), "http://x/a")
            .await
            .unwrap_err();
        match err {
            FetchError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "HTTP 500");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(http.calls(), 3);
        assert_eq!(sleeper.slept(), secs(&[5, 10]));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(20),
            max_delay: Duration::from_secs(60),
        };
        let mut state = RetryState::new(policy, "u");
        let mut waits = Vec::new();
        loop {
            match state.on_outcome(Outcome::Retryable("HTTP 503".into())) {
                Step::Wait(d) => waits.push(d),
                Step::GiveUp(_) => break,
                Step::Done(_) => unreachable!(),
            }
        }
        assert_eq!(waits, secs(&[20, 40, 60, 60]));
        assert_eq!(state.attempts(), 5);
    }

    #[test]
    fn classification() {
        assert_eq!(classify("u", Ok(HttpResponse { status: 204, body: String::new() })), Outcome::Success(String::new()));
        assert!(matches!(classify("u", Ok(HttpResponse { status: 504, body: String::new() })), Outcome::Retryable(_)));
        assert!(matches!(classify("u", Ok(HttpResponse { status: 403, body: String::new() })), Outcome::Permanent(_)));
        assert!(matches!(classify("u", Err(FetchError::Transport("timeout".into()))), Outcome::Retryable(_)));
    }
}
