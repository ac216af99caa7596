//! `HttpClient` over reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Reqwest-based HTTP client
///
/// - Connection pooling shared by API calls, part uploads and range reads
/// - Retry on transport errors, 5xx and 429 according to a [`RetryPolicy`]
/// - Streamed response bodies for downloads
pub struct ReqwestHttpClient {
    client: Client,
    /// Policy used by [`HttpClient::execute`]
    default_retry: RetryPolicy,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(300))
    }

    /// The timeout bounds a whole request, so it must cover one part upload
    /// on a slow link.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(16)
            .user_agent(concat!("pan-mirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            default_retry: RetryPolicy::no_retry(),
        }
    }

    /// Retry policy for plain `execute` calls. Defaults to a single attempt;
    /// the transfer engine retries at the operation level.
    pub fn with_default_retry(mut self, policy: RetryPolicy) -> Self {
        self.default_retry = policy;
        self
    }

    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(Self::convert_method(request.method), &request.url);

        for (key, value) in request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }

    /// Statuses worth another attempt.
    fn is_retryable_status(status: u16) -> bool {
        status == 429 || (500..600).contains(&status)
    }

    fn transport_error(error: reqwest::Error) -> BridgeError {
        if error.is_timeout() {
            BridgeError::OperationFailed("Request timed out".to_string())
        } else if error.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", error))
        } else {
            BridgeError::OperationFailed(error.to_string())
        }
    }

    async fn into_response(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();
        let body = response.bytes().await.map_err(Self::transport_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, self.default_retry.clone())
            .await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match self.build_request(request.clone()).send().await {
                Ok(response) if Self::is_retryable_status(response.status().as_u16()) => {
                    if attempt >= attempts {
                        // The caller interprets the final status.
                        return Self::into_response(response).await;
                    }
                    BridgeError::OperationFailed(format!("HTTP {}", response.status()))
                }
                Ok(response) => return Self::into_response(response).await,
                Err(e) => Self::transport_error(e),
            };

            if attempt >= attempts {
                return Err(error);
            }
            let delay = policy.delay_for_attempt(attempt);
            warn!(
                error = %error,
                attempt,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                "HTTP request failed, retrying"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    async fn download_stream(
        &self,
        request: HttpRequest,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        debug!(range = ?request.headers.get("Range"), "Opening download stream");

        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = format!("HTTP error: {}", response.status());
            return Err(if Self::is_retryable_status(status) {
                BridgeError::OperationFailed(message)
            } else {
                BridgeError::rejected(i64::from(status), message)
            });
        }

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(tokio_util::io::StreamReader::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds_with_single_attempt_default() {
        let client = ReqwestHttpClient::new().unwrap();
        assert_eq!(client.default_retry.max_attempts, 1);

        let client = client.with_default_retry(RetryPolicy::default());
        assert_eq!(client.default_retry.max_attempts, 3);
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Put),
            reqwest::Method::PUT
        );
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Head),
            reqwest::Method::HEAD
        );
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(ReqwestHttpClient::is_retryable_status(429));
        assert!(ReqwestHttpClient::is_retryable_status(503));
        assert!(!ReqwestHttpClient::is_retryable_status(403));
        assert!(!ReqwestHttpClient::is_retryable_status(200));
    }

    #[test]
    fn test_build_request_carries_range_and_body() {
        let client = ReqwestHttpClient::new().unwrap();
        let request = HttpRequest::new(HttpMethod::Put, "https://s3.example/part?sig=1")
            .range(10, 19)
            .body(bytes::Bytes::from_static(b"part"));

        let built = client.build_request(request).build().unwrap();
        assert_eq!(built.method(), reqwest::Method::PUT);
        assert_eq!(built.headers().get("Range").unwrap(), "bytes=10-19");
        assert_eq!(
            built.body().and_then(|b| b.as_bytes()),
            Some(b"part".as_slice())
        );
    }
}
