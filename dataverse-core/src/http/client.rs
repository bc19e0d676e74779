//! Blocking HTTP GET with bounded retries.
//!
//! Transient failures (connect errors, timeouts, HTTP 429 and 5xx) are retried
//! according to the injected `RetryPolicy`. Anything else returns immediately.
//! The total number of requests per call never exceeds `max_attempts`.

use super::retry::RetryPolicy;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("dataverse/", env!("CARGO_PKG_VERSION"));
const BODY_EXCERPT_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Retries exhausted on a transient failure.
    #[error("network failure after {attempts} attempt(s): {reason}")]
    Network { attempts: u32, reason: String },

    /// The server rejected the request in a way retrying will not fix.
    #[error("HTTP {status}: {body}")]
    Permanent { status: u16, body: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network { .. })
    }
}

/// Successful (2xx) response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// How many requests it took, including this one.
    pub attempts: u32,
}

impl RawResponse {
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

enum Outcome {
    Done(RawResponse),
    Retry {
        reason: String,
        retry_after: Option<Duration>,
    },
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::blocking::Client,
    policy: RetryPolicy,
}

impl HttpClient {
    pub fn new(policy: RetryPolicy, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `endpoint` with query `params`.
    pub fn fetch(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<RawResponse, FetchError> {
        let max = self.policy.max_attempts();
        let mut last_reason = String::from("no attempt made");

        for attempt in 1..=max {
            match self.attempt(endpoint, params, attempt)? {
                Outcome::Done(resp) => {
                    tracing::debug!(endpoint, attempt, status = resp.status, "fetch ok");
                    return Ok(resp);
                }
                Outcome::Retry {
                    reason,
                    retry_after,
                } => {
                    if attempt < max {
                        let delay = self.policy.delay_for(attempt, retry_after);
                        tracing::warn!(
                            endpoint,
                            attempt,
                            max_attempts = max,
                            delay_ms = delay.as_millis() as u64,
                            %reason,
                            "transient fetch failure, retrying"
                        );
                        std::thread::sleep(delay);
                    }
                    last_reason = reason;
                }
            }
        }

        tracing::warn!(endpoint, attempts = max, reason = %last_reason, "retries exhausted");
        Err(FetchError::Network {
            attempts: max,
            reason: last_reason,
        })
    }

    fn attempt(
        &self,
        endpoint: &str,
        params: &[(String, String)],
        attempt: u32,
    ) -> Result<Outcome, FetchError> {
        let resp = match self.client.get(endpoint).query(params).send() {
            Ok(resp) => resp,
            Err(e) if e.is_builder() => return Err(FetchError::InvalidRequest(e.to_string())),
            Err(e) => {
                return Ok(Outcome::Retry {
                    reason: e.to_string(),
                    retry_after: None,
                })
            }
        };

        let status = resp.status();
        if status.is_success() {
            return match resp.text() {
                Ok(body) => Ok(Outcome::Done(RawResponse {
                    status: status.as_u16(),
                    body,
                    attempts: attempt,
                })),
                Err(e) => Ok(Outcome::Retry {
                    reason: format!("failed to read body: {e}"),
                    retry_after: None,
                }),
            };
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Ok(Outcome::Retry {
                reason: format!("HTTP {status}"),
                retry_after,
            });
        }

        if status.is_server_error() {
            return Ok(Outcome::Retry {
                reason: format!("HTTP {status}"),
                retry_after: None,
            });
        }

        let body = resp.text().unwrap_or_default();
        Err(FetchError::Permanent {
            status: status.as_u16(),
            body: excerpt(&body),
        })
    }
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::retry::Jitter;

    fn fast_client(attempts: u32) -> HttpClient {
        let policy = RetryPolicy::new(attempts, Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
            .with_jitter(Jitter::None);
        HttpClient::new(policy, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn success_on_first_attempt() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/quote")
            .match_query(mockito::Matcher::UrlEncoded("symbol".into(), "AAPL".into()))
            .with_status(200)
            .with_body(r#"[{"price": 1.0}]"#)
            .expect(1)
            .create();

        let client = fast_client(3);
        let resp = client
            .fetch(
                &format!("{}/quote", server.url()),
                &[("symbol".into(), "AAPL".into())],
            )
            .unwrap();

        mock.assert();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.attempts, 1);
        assert!(resp.json().unwrap().is_array());
    }

    #[test]
    fn server_errors_exhaust_exactly_max_attempts() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(3)
            .create();

        let err = fast_client(3)
            .fetch(&format!("{}/flaky", server.url()), &[])
            .unwrap_err();

        mock.assert();
        match err {
            FetchError::Network { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("503"), "{reason}");
            }
            other => panic!("expected network error, got {other:?}"),
        }
    }

    #[test]
    fn client_errors_are_not_retried() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("not here")
            .expect(1)
            .create();

        let err = fast_client(3)
            .fetch(&format!("{}/missing", server.url()), &[])
            .unwrap_err();

        mock.assert();
        assert!(!err.is_transient());
        match err {
            FetchError::Permanent { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "not here");
            }
            other => panic!("expected permanent error, got {other:?}"),
        }
    }

    #[test]
    fn rate_limit_is_retried() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/limited")
            .with_status(429)
            .with_header("Retry-After", "0")
            .expect(2)
            .create();

        let err = fast_client(2)
            .fetch(&format!("{}/limited", server.url()), &[])
            .unwrap_err();

        mock.assert();
        assert!(err.is_transient());
    }

    #[test]
    fn single_attempt_policy_does_not_retry() {
        let mut server = mockito::Server::new();
        let mock = server.mock("GET", "/down").with_status(500).expect(1).create();

        let err = fast_client(1)
            .fetch(&format!("{}/down", server.url()), &[])
            .unwrap_err();

        mock.assert();
        assert!(matches!(err, FetchError::Network { attempts: 1, .. }));
    }

    #[test]
    fn connection_refused_is_transient() {
        // Port 9 (discard) is almost never listening on localhost.
        let err = fast_client(2)
            .fetch("http://127.0.0.1:9/nothing", &[])
            .unwrap_err();
        assert!(matches!(err, FetchError::Network { attempts: 2, .. }));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(BODY_EXCERPT_LEN + 50);
        let out = excerpt(&body);
        assert!(out.ends_with("..."));
        assert_eq!(out.len(), BODY_EXCERPT_LEN + 3);
    }

    /// Shared in-memory sink for a test subscriber.
    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn each_retry_is_logged_with_attempt_and_delay() {
        let mut server = mockito::Server::new();
        let mock = server.mock("GET", "/busy").with_status(503).expect(3).create();

        let logs = LogBuffer::default();
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        let err = tracing::subscriber::with_default(subscriber, || {
            fast_client(3)
                .fetch(&format!("{}/busy", server.url()), &[])
                .unwrap_err()
        });
        mock.assert();
        assert!(matches!(err, FetchError::Network { attempts: 3, .. }));

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let retries: Vec<&str> = text
            .lines()
            .filter(|l| l.contains("transient fetch failure, retrying"))
            .collect();
        assert_eq!(retries.len(), 2, "{text}");
        assert!(retries[0].contains("attempt=1") && retries[0].contains("delay_ms=1"));
        assert!(retries[1].contains("attempt=2") && retries[1].contains("delay_ms=2"));
        assert!(text.contains("retries exhausted"));
    }
}
