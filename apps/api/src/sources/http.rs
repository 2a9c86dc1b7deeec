use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use super::SourceError;

const USER_AGENT: &str = "JobScoutBot/0.1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(25);
const MAX_ATTEMPTS: u32 = 3;

/// Shared HTTP client for connectors. Retries transient failures with
/// exponential backoff; 403 is reported as an anti-bot block and not retried.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_attempts: u32,
    retry_base: Duration,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SourceError::Http {
                url: String::new(),
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            max_attempts: MAX_ATTEMPTS,
            retry_base: Duration::from_secs(1),
        })
    }

    /// Overrides the first backoff delay; later delays double.
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        self.send_json(url, || self.client.get(url)).await
    }

    pub async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, SourceError> {
        self.send_json(url, || self.client.post(url).json(body)).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        url: &str,
        request: impl Fn() -> RequestBuilder,
    ) -> Result<T, SourceError> {
        let mut attempt = 0;
        loop {
            match self.send_once(url, request()).await {
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.retry_base * (1 << attempt);
                    warn!(
                        "Fetch of {url} failed ({e}), retrying after {}ms...",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        url: &str,
        request: RequestBuilder,
    ) -> Result<T, SourceError> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(SourceError::Blocked {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| classify(url, e))?;
        serde_json::from_slice(&body).map_err(|e| SourceError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

fn classify(url: &str, error: reqwest::Error) -> SourceError {
    if error.is_timeout() {
        SourceError::Timeout {
            url: url.to_string(),
        }
    } else {
        SourceError::Http {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new()
            .unwrap()
            .with_retry_base(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let body: Value = fetcher()
            .get_json(&format!("{}/jobs", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetcher()
            .get_json::<Value>(&format!("{}/jobs", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_forbidden_is_blocked_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher()
            .get_json::<Value>(&format!("{}/jobs", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Blocked { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>captcha</html>"))
            .mount(&server)
            .await;

        let err = fetcher()
            .get_json::<Value>(&format!("{}/jobs", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }
}
