use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use shelfmark_core::config::CatalogConfig;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{CatalogError, Result};

const USER_AGENT: &str = concat!("shelfmark/", env!("CARGO_PKG_VERSION"));

// Upper bound on a server-provided Retry-After.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Timeout and retry rules for one upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retryable_status_codes: Vec<u16>,
    pub backoff: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::from_config(&CatalogConfig::default())
    }
}

impl RequestPolicy {
    pub fn from_config(config: &CatalogConfig) -> Self {
        Self {
            timeout: Duration::from_secs_f64(config.timeout_secs),
            max_retries: config.max_retries,
            retryable_status_codes: config.retryable_status_codes.clone(),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.retryable_status_codes.contains(&status.as_u16())
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// GET client that retries timeouts, transport errors and retryable statuses.
pub struct RetryingClient {
    client: reqwest::Client,
    policy: RequestPolicy,
    upstream: String,
}

impl RetryingClient {
    pub fn new(upstream: impl Into<String>, policy: RequestPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .gzip(true)
            .timeout(policy.timeout)
            .build()?;
        Ok(Self {
            client,
            policy,
            upstream: upstream.into(),
        })
    }

    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            let can_retry = attempt < self.policy.max_retries;
            let resp = self.client.get(url).query(query).send().await;

            let (error, wait) = match resp {
                Ok(r) if r.status().is_success() => {
                    return r.text().await.map_err(|source| self.communication(source));
                }
                Ok(r) => {
                    let status = r.status();
                    let error = CatalogError::Status {
                        upstream: self.upstream.clone(),
                        status: status.as_u16(),
                    };
                    if !self.policy.is_retryable_status(status) {
                        return Err(self.give_up(error, false));
                    }
                    let retry_after = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER));
                    (error, retry_after.unwrap_or_else(|| self.policy.delay(attempt)))
                }
                Err(e) if e.is_timeout() => (
                    CatalogError::Timeout {
                        upstream: self.upstream.clone(),
                        timeout: self.policy.timeout,
                    },
                    self.policy.delay(attempt),
                ),
                Err(e) if e.is_builder() => return Err(CatalogError::Http(e)),
                Err(e) => (self.communication(e), self.policy.delay(attempt)),
            };

            if !can_retry {
                return Err(self.give_up(error, true));
            }
            debug!(
                upstream = %self.upstream,
                attempt = attempt + 1,
                ?wait,
                %error,
                "retrying catalog request"
            );
            if !wait.is_zero() {
                sleep(wait).await;
            }
            attempt += 1;
        }
    }

    fn communication(&self, source: reqwest::Error) -> CatalogError {
        CatalogError::Communication {
            upstream: self.upstream.clone(),
            source,
        }
    }

    fn give_up(&self, error: CatalogError, retryable: bool) -> CatalogError {
        warn!(
            upstream = %self.upstream,
            failure = ?error.failure(),
            retryable,
            %error,
            "catalog request failed"
        );
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn policy(max_retries: u32) -> RequestPolicy {
        RequestPolicy {
            timeout: Duration::from_secs(5),
            max_retries,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn backoff_doubles() {
        let policy = RequestPolicy {
            backoff: Duration::from_millis(100),
            ..policy(3)
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn sends_query_and_returns_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("q".into(), "本".into()))
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let client = RetryingClient::new("test", policy(0)).unwrap();
        let body = client
            .get_text(&format!("{}/search", server.url()), &[("q", "本".to_string())])
            .await
            .unwrap();
        assert_eq!(body, "ok");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retryable_status_is_retried_up_to_budget() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let client = RetryingClient::new("test", policy(1)).unwrap();
        let err = client
            .get_text(&format!("{}/search", server.url()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Status { status: 503, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn other_statuses_fail_immediately() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = RetryingClient::new("test", policy(3)).unwrap();
        let err = client
            .get_text(&format!("{}/search", server.url()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Status { status: 404, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn connection_failure_is_communication_error() {
        let client = RetryingClient::new("test", policy(1)).unwrap();
        let err = client
            .get_text("http://127.0.0.1:1/search", &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Communication { .. } | CatalogError::Timeout { .. }
        ));
    }
}
