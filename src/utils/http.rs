// src/utils/http.rs

//! HTTP client utilities shared by source adapters.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};

use crate::error::{Result, SourceError};
use crate::models::SyncConfig;

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &SyncConfig, timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}

/// Bounded exponential backoff for transient upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Sleep before retry number `attempt` (0-based).
    ///
    /// An upstream `Retry-After` hint wins when it is longer.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let backoff = self.base_delay.saturating_mul(factor);
        let delay = match retry_after {
            Some(hint) if hint > backoff => hint,
            _ => backoff,
        };
        delay.min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Send a request, retrying 5xx, 429 and transport timeouts.
///
/// `build` is called once per attempt. Successful and 404 responses are
/// returned; the caller decides what absence means. Auth failures are
/// never retried.
pub async fn send_with_retry<F>(
    policy: RetryPolicy,
    build: F,
) -> std::result::Result<Response, SourceError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let can_retry = attempt < policy.max_retries;

        let response = match build().send().await {
            Ok(response) => response,
            Err(err) => {
                let err = SourceError::Transport(err);
                if can_retry && err.is_transient() {
                    let delay = policy.delay_for(attempt, None);
                    log::warn!("Transport failure ({err}); retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Err(err);
            }
        };

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::Auth {
                status: status.as_u16(),
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let hint = retry_after(&response);
            if can_retry {
                let delay = policy.delay_for(attempt, hint);
                log::warn!("Rate limited by {}; retrying in {delay:?}", response.url());
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            return Err(SourceError::RateLimited {
                retry_after_secs: hint.map(|d| d.as_secs()),
            });
        }

        if status.is_server_error() && can_retry {
            let delay = policy.delay_for(attempt, None);
            log::warn!("Upstream returned {status}; retrying in {delay:?}");
            tokio::time::sleep(delay).await;
            attempt += 1;
            continue;
        }

        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Upstream {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local server answering each connection with the next scripted
    /// response; the last one repeats.
    struct Stub {
        url: String,
        hits: Arc<AtomicUsize>,
    }

    impl Stub {
        async fn start(script: &[(u16, &str)]) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}/resource", listener.local_addr().unwrap());
            let hits = Arc::new(AtomicUsize::new(0));
            let script: Vec<(u16, String)> =
                script.iter().map(|(s, h)| (*s, h.to_string())).collect();

            let counter = hits.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((mut socket, _)) = listener.accept().await else {
                        return;
                    };
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    let (status, headers) = script[n.min(script.len() - 1)].clone();

                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(read) => request.extend_from_slice(&buf[..read]),
                        }
                    }

                    let response = format!(
                        "HTTP/1.1 {status} Scripted\r\nContent-Length: 4\r\nConnection: close\r\n{headers}\r\nbody"
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });

            Self { url, hits }
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        }
    }

    async fn send(stub: &Stub) -> std::result::Result<Response, SourceError> {
        let client = reqwest::Client::new();
        send_with_retry(quick(), || client.get(&stub.url)).await
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let p = policy();
        assert_eq!(p.delay_for(0, None), Duration::from_millis(500));
        assert_eq!(p.delay_for(1, None), Duration::from_millis(1000));
        assert_eq!(p.delay_for(2, None), Duration::from_millis(2000));
    }

    #[test]
    fn test_retry_after_hint_wins_when_longer() {
        let p = policy();
        assert_eq!(
            p.delay_for(0, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            p.delay_for(3, Some(Duration::from_millis(10))),
            Duration::from_millis(4000)
        );
    }

    #[test]
    fn test_backoff_is_capped() {
        let p = policy();
        assert_eq!(p.delay_for(30, None), MAX_BACKOFF);
        assert_eq!(p.delay_for(0, Some(Duration::from_secs(3600))), MAX_BACKOFF);
    }

    #[test]
    fn test_create_client() {
        let config = SyncConfig::default();
        assert!(create_async_client(&config, config.lookup_timeout_secs).is_ok());
    }

    #[tokio::test]
    async fn test_auth_failures_are_not_retried() {
        for status in [401, 403] {
            let stub = Stub::start(&[(status, "")]).await;
            let err = send(&stub).await.unwrap_err();
            assert!(matches!(err, SourceError::Auth { status: s } if s == status));
            assert_eq!(stub.hits(), 1);
        }
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_retries() {
        let stub = Stub::start(&[(429, "Retry-After: 0\r\n")]).await;
        let err = send(&stub).await.unwrap_err();
        assert!(matches!(
            err,
            SourceError::RateLimited {
                retry_after_secs: Some(0)
            }
        ));
        assert_eq!(err.kind(), "rate_limit");
        assert_eq!(stub.hits(), 3);
    }

    #[tokio::test]
    async fn test_server_errors_retried_until_success() {
        let stub = Stub::start(&[(503, ""), (502, ""), (200, "")]).await;
        let response = send(&stub).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(stub.hits(), 3);
    }

    #[tokio::test]
    async fn test_persistent_server_error_is_upstream() {
        let stub = Stub::start(&[(500, "")]).await;
        let err = send(&stub).await.unwrap_err();
        match err {
            SourceError::Upstream { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "body");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
        assert_eq!(stub.hits(), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_upstream_without_retry() {
        let stub = Stub::start(&[(400, "")]).await;
        let err = send(&stub).await.unwrap_err();
        assert!(matches!(err, SourceError::Upstream { status: 400, .. }));
        assert_eq!(stub.hits(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_passed_through() {
        let stub = Stub::start(&[(404, "")]).await;
        let response = send(&stub).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(stub.hits(), 1);
    }
}
