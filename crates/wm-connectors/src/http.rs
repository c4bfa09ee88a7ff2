//! HTTP utilities for connectors.
//!
//! [`HttpClient`] wraps `reqwest` with the behaviour every HTTP-backed
//! connector needs: status-to-error mapping, optional client-side rate
//! limiting, optional retries with backoff, and per-request credentials,
//! headers and timeouts.

use crate::secure_string::SecureString;
use crate::traits::{ConnectorConfig, ConnectorError, ConnectorResult};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

type RateLimiterType = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// HTTP client with retry and rate limiting support.
pub struct HttpClient {
    client: Client,
    config: ConnectorConfig,
    rate_limiter: Option<Arc<RateLimiterType>>,
}

/// Client-side rate limit.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per period.
    pub max_requests: u32,
    /// Period duration.
    pub period: Duration,
    /// Maximum burst size.
    pub burst_size: u32,
}

impl RateLimitConfig {
    /// A limit of `max_requests` per minute without bursting.
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            period: Duration::from_secs(60),
            burst_size: 1,
        }
    }
}

/// Per-request options layered on top of the client defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    bearer: Option<SecureString>,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `Authorization: Bearer <token>`.
    pub fn bearer(mut self, token: &SecureString) -> Self {
        self.bearer = Some(token.clone());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Overrides the client-wide timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn apply(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.bearer {
            request = request.header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            );
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !self.query.is_empty() {
            request = request.query(&self.query);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        request
    }
}

impl HttpClient {
    /// Creates a new HTTP client from connector configuration.
    pub fn new(config: ConnectorConfig) -> ConnectorResult<Self> {
        Self::with_rate_limit(config, None)
    }

    /// Creates a new HTTP client with rate limiting.
    pub fn with_rate_limit(
        config: ConnectorConfig,
        rate_limit: Option<RateLimitConfig>,
    ) -> ConnectorResult<Self> {
        // TLS verification can only be turned off in debug builds.
        let verify_tls = if config.verify_tls {
            true
        } else if cfg!(debug_assertions) {
            warn!(
                base_url = %config.base_url,
                connector_name = %config.name,
                "TLS certificate verification disabled in development mode"
            );
            false
        } else {
            warn!(
                base_url = %config.base_url,
                connector_name = %config.name,
                "Ignoring request to disable TLS verification in a release build"
            );
            true
        };

        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in &config.headers {
            if let (Ok(name), Ok(val)) = (
                reqwest::header::HeaderName::try_from(key.as_str()),
                reqwest::header::HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(name, val);
            }
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!verify_tls)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .default_headers(headers)
            .build()
            .map_err(|e| ConnectorError::ConfigError(e.to_string()))?;

        let rate_limiter = match rate_limit {
            Some(rl) => {
                let max_requests = rl.max_requests.max(1);
                let quota = Quota::with_period(rl.period / max_requests)
                    .ok_or_else(|| {
                        ConnectorError::ConfigError("Rate limit period must be non-zero".into())
                    })?
                    .allow_burst(NonZeroU32::new(rl.burst_size).unwrap_or(NonZeroU32::MIN));
                Some(Arc::new(GovernorRateLimiter::direct(quota)))
            }
            None => None,
        };

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// Builds a URL from a path. An empty path addresses the base URL itself.
    pub fn build_url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Gets the base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Executes a GET request.
    pub async fn get(&self, path: &str, options: &RequestOptions) -> ConnectorResult<Response> {
        let request = options.apply(self.client.get(self.build_url(path)));
        self.execute_with_retry(request).await
    }

    /// Executes a GET request and deserializes the JSON response.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> ConnectorResult<T> {
        let response = self.get(path, options).await?;
        parse_json_response(response).await
    }

    /// Executes a POST request with a JSON body.
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        options: &RequestOptions,
    ) -> ConnectorResult<Response> {
        let request = options.apply(self.client.post(self.build_url(path)).json(body));
        self.execute_with_retry(request).await
    }

    /// Executes a POST request and deserializes the JSON response.
    pub async fn post_json<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
        options: &RequestOptions,
    ) -> ConnectorResult<R> {
        let response = self.post(path, body, options).await?;
        parse_json_response(response).await
    }

    /// Executes a form-encoded POST against an absolute URL, e.g. an OAuth2 token endpoint.
    pub async fn post_form_url<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        form: &T,
    ) -> ConnectorResult<R> {
        let request = self.client.post(url).form(form);
        let response = self.execute_with_retry(request).await?;
        parse_json_response(response).await
    }

    /// Executes a request with rate limiting, retries, and status mapping.
    async fn execute_with_retry(&self, request: RequestBuilder) -> ConnectorResult<Response> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let mut last_error = None;
        let mut delay = Duration::from_millis(100);

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {} after {:?}", attempt, delay);
                sleep(delay).await;
                delay = std::cmp::min(delay * 2 + rand_jitter(), Duration::from_secs(30));
            }

            let request_clone = request
                .try_clone()
                .ok_or_else(|| ConnectorError::Internal("Failed to clone request".to_string()))?;

            match request_clone.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);

                        if attempt < self.config.max_retries {
                            warn!("Rate limited, waiting {} seconds", retry_after);
                            sleep(Duration::from_secs(retry_after)).await;
                            continue;
                        }
                        return Err(ConnectorError::RateLimited(retry_after));
                    }

                    if status.is_server_error() {
                        let error = ConnectorError::RequestFailed(format!(
                            "Server error: {}",
                            status
                        ));
                        if attempt < self.config.max_retries {
                            warn!("Server error {}, retrying...", status);
                            last_error = Some(error);
                            continue;
                        }
                        return Err(error);
                    }

                    if status.is_client_error() {
                        return Err(client_error(status, response).await);
                    }

                    return Ok(response);
                }
                Err(e) => {
                    last_error = Some(transport_error(&e));
                    if attempt >= self.config.max_retries {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ConnectorError::Internal("Unknown error".to_string())))
    }
}

async fn client_error(status: StatusCode, response: Response) -> ConnectorError {
    match status {
        StatusCode::UNAUTHORIZED => ConnectorError::AuthenticationFailed("Unauthorized".into()),
        StatusCode::FORBIDDEN => ConnectorError::AuthorizationDenied("Forbidden".into()),
        StatusCode::NOT_FOUND => ConnectorError::NotFound("Resource not found".into()),
        _ => {
            let body = response.text().await.unwrap_or_default();
            ConnectorError::RequestFailed(format!(
                "Client error {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            ))
        }
    }
}

fn transport_error(e: &reqwest::Error) -> ConnectorError {
    if e.is_timeout() {
        ConnectorError::Timeout(e.to_string())
    } else if e.is_connect() {
        ConnectorError::ConnectionFailed(e.to_string())
    } else {
        ConnectorError::RequestFailed(e.to_string())
    }
}

/// Reads a response body as JSON, keeping a snippet of the body on failure.
async fn parse_json_response<T: DeserializeOwned>(response: Response) -> ConnectorResult<T> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ConnectorError::InvalidResponse(e.to_string()))?;

    serde_json::from_str(&text).map_err(|e| {
        ConnectorError::InvalidResponse(format!(
            "Failed to parse response (status {}): {} - Body: {}",
            status,
            e,
            text.chars().take(500).collect::<String>()
        ))
    })
}

fn rand_jitter() -> Duration {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::time::Instant::now().hash(&mut hasher);
    Duration::from_millis(hasher.finish() % 100)
}
