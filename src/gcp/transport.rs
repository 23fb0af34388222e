//! # Remote Operation Transport
//!
//! [`Transport`] is the single primitive every remote interaction goes
//! through: send a JSON request, get decoded JSON back or a typed error.
//! [`HttpTransport`] is the real implementation; it attaches the bearer token,
//! and retries transient failures before giving up.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
        })
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

pub trait Transport {
    fn execute(&self, method: Method, url: &str, body: Option<&Value>)
    -> Result<Value, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        (**self).execute(method, url, body)
    }
}

/// Status codes that are retried, for every method including POST.
pub const RETRY_STATUSES: &[u16] = &[400, 403, 404, 429, 500, 502, 503, 504];

/// Maximum sleep between two attempts.
const BACKOFF_MAX: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the `retry`-th retry (1-based): the first retry is
    /// immediate, then `backoff * 2^(retry - 1)`.
    pub fn delay(&self, retry: u32) -> Duration {
        if retry <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.backoff.saturating_mul(factor).min(BACKOFF_MAX)
    }

    pub fn should_retry(&self, err: &TransportError) -> bool {
        match err {
            TransportError::Status { status, .. } => RETRY_STATUSES.contains(status),
            TransportError::Request(_) => true,
            TransportError::Decode(_) => false,
        }
    }
}

#[cfg(feature = "reqwest")]
pub use http::HttpTransport;

#[cfg(feature = "reqwest")]
mod http {
    use reqwest::header::CONTENT_TYPE;
    use serde_json::{Map, Value};
    use tracing::{debug, warn};

    use super::{Method, RetryPolicy, Transport, TransportError};
    use crate::client::BLOCKING_CLIENT;
    use crate::provision::poll::{Sleeper, ThreadSleeper};

    /// Blocking HTTP transport bound to one bearer token.
    pub struct HttpTransport<S: Sleeper = ThreadSleeper> {
        token: String,
        retry: RetryPolicy,
        sleeper: S,
    }

    impl HttpTransport {
        pub fn new(token: String, retry: RetryPolicy) -> Self {
            Self {
                token,
                retry,
                sleeper: ThreadSleeper,
            }
        }
    }

    impl<S: Sleeper> HttpTransport<S> {
        /// Replaces how the transport waits between retries.
        pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> HttpTransport<S2> {
            HttpTransport {
                token: self.token,
                retry: self.retry,
                sleeper,
            }
        }

        fn send_once(
            &self,
            method: Method,
            url: &str,
            body: Option<&Value>,
        ) -> Result<Value, TransportError> {
            let client = &*BLOCKING_CLIENT;
            let req = match method {
                Method::Get => client.get(url),
                Method::Post => client.post(url),
            };
            let mut req = req
                .bearer_auth(&self.token)
                .header(CONTENT_TYPE, "application/json");
            if let Some(body) = body {
                req = req.json(body);
            }

            let res = req
                .send()
                .map_err(|e| TransportError::Request(e.to_string()))?;
            let status = res.status();
            let text = res
                .text()
                .map_err(|e| TransportError::Request(e.to_string()))?;
            if !status.is_success() {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    body: text,
                });
            }
            if text.trim().is_empty() {
                return Ok(Value::Object(Map::new()));
            }
            serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
        }
    }

    impl<S: Sleeper> Transport for HttpTransport<S> {
        fn execute(
            &self,
            method: Method,
            url: &str,
            body: Option<&Value>,
        ) -> Result<Value, TransportError> {
            let mut retry = 0;
            loop {
                debug!(%method, url, body = ?body, retry, "performing HTTP request");
                match self.send_once(method, url, body) {
                    Ok(value) => return Ok(value),
                    Err(e) if retry < self.retry.max_retries && self.retry.should_retry(&e) => {
                        retry += 1;
                        let delay = self.retry.delay(retry);
                        warn!(%method, url, retry, ?delay, error = %e, "retrying HTTP request");
                        if !delay.is_zero() {
                            self.sleeper.sleep(delay);
                        }
                    }
                    Err(e) => {
                        warn!(%method, url, error = %e, "HTTP request has failed");
                        return Err(e);
                    }
                }
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use std::time::Duration;

        use serde_json::json;

        use super::*;
        use crate::testing::{LoopbackServer, RecordingSleeper};

        fn policy(max_retries: u32) -> RetryPolicy {
            RetryPolicy {
                max_retries,
                ..RetryPolicy::default()
            }
        }

        #[test]
        fn transient_status_is_retried_until_success() {
            let server = LoopbackServer::start(&[(503, "busy"), (200, r#"{"name":"op/1"}"#)]);
            let sleeper = RecordingSleeper::default();
            let transport = HttpTransport::new("tok".into(), policy(3)).with_sleeper(&sleeper);

            let value = transport
                .execute(Method::Post, &server.url, Some(&json!({"projectId": "p"})))
                .unwrap();
            assert_eq!(value, json!({"name": "op/1"}));
            assert_eq!(server.count(), 2);
            assert!(sleeper.slept().is_empty());

            let first = &server.requests()[0];
            assert!(first.starts_with("POST / "));
            assert!(first.to_ascii_lowercase().contains("authorization: bearer tok"));
            assert!(first.to_ascii_lowercase().contains("content-type: application/json"));
            assert!(first.ends_with(r#"{"projectId":"p"}"#));
        }

        #[test]
        fn persistent_failure_gives_up_after_max_retries() {
            let server = LoopbackServer::start(&[(503, "busy")]);
            let sleeper = RecordingSleeper::default();
            let transport = HttpTransport::new("tok".into(), policy(3)).with_sleeper(&sleeper);

            let err = transport.execute(Method::Get, &server.url, None).unwrap_err();
            assert!(matches!(err, TransportError::Status { status: 503, .. }));
            assert_eq!(server.count(), 4);
            assert_eq!(
                sleeper.slept(),
                vec![Duration::from_secs(2), Duration::from_secs(4)]
            );
        }

        #[test]
        fn non_retryable_status_fails_at_once() {
            let server = LoopbackServer::start(&[(409, r#"{"error":"exists"}"#)]);
            let sleeper = RecordingSleeper::default();
            let transport = HttpTransport::new("tok".into(), policy(5)).with_sleeper(&sleeper);

            let err = transport.execute(Method::Post, &server.url, None).unwrap_err();
            assert!(matches!(err, TransportError::Status { status: 409, .. }));
            assert_eq!(server.count(), 1);
        }

        #[test]
        fn empty_success_body_is_an_empty_object() {
            let server = LoopbackServer::start(&[(200, "")]);
            let transport = HttpTransport::new("tok".into(), policy(0))
                .with_sleeper(RecordingSleeper::default());
            assert_eq!(
                transport.execute(Method::Get, &server.url, None).unwrap(),
                json!({})
            );
        }

        #[test]
        fn invalid_json_is_not_retried() {
            let server = LoopbackServer::start(&[(200, "<html>")]);
            let transport = HttpTransport::new("tok".into(), policy(5))
                .with_sleeper(RecordingSleeper::default());
            let err = transport.execute(Method::Get, &server.url, None).unwrap_err();
            assert!(matches!(err, TransportError::Decode(_)));
            assert_eq!(server.count(), 1);
        }
    }
}
