//! HTTP client wrapper for outbound JSON API calls.
//!
//! This module provides the [`FetchClient`] struct which performs GET/POST
//! calls behind the shared [`RateGate`], classifies responses, and retries
//! rate-limited calls a bounded number of times.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_AFTER, READ_TIMEOUT_SECS,
};
use super::error::FetchError;
use super::gate::{RateGate, parse_retry_after};
use crate::user_agent;

/// HTTP client for JSON API calls that honors the shared rate gate.
///
/// The client is cheap to clone; clones share the connection pool and the gate.
///
/// # Example
///
/// ```no_run
/// use trackbatch_core::fetch::{FetchClient, RateGate};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let gate = RateGate::new();
/// let client = FetchClient::new(gate.clone());
/// let me: serde_json::Value = client
///     .get_json("https://api.example.com/me", &[("Authorization", "OAuth token")])
///     .await?;
/// println!("{me}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    gate: RateGate,
    max_attempts: u32,
}

impl FetchClient {
    /// Creates a client with default timeouts sharing the given gate.
    ///
    /// Default configuration:
    /// - Connect timeout: 10 seconds
    /// - Read timeout: 30 seconds
    /// - Max attempts on HTTP 429: 5
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new(gate: RateGate) -> Self {
        Self::with_timeouts(gate, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(gate: RateGate, connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            gate,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the maximum number of attempts per call (initial attempt included, at least 1).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Returns the configured attempt bound.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the gate this client waits on.
    #[must_use]
    pub fn gate(&self) -> &RateGate {
        &self.gate
    }

    /// Performs a GET and returns the parsed JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Upstream`] for any status other than 200/201
    /// (including 429 once the attempt bound is spent), [`FetchError::Parse`]
    /// when the body is not JSON, and network/timeout errors otherwise.
    pub async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<serde_json::Value, FetchError> {
        self.get(url, headers).await
    }

    /// Performs a GET and deserializes the body into `T`.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        self.execute(Method::GET, url, headers, None).await
    }

    /// Performs a POST with a JSON body and returns the parsed JSON response.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json); also fails with
    /// [`FetchError::Parse`] if `body` cannot be serialized.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &B,
    ) -> Result<serde_json::Value, FetchError> {
        self.post(url, headers, body).await
    }

    /// Performs a POST with a JSON body and deserializes the response into `T`.
    ///
    /// # Errors
    ///
    /// Same as [`post_json`](Self::post_json).
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &B,
    ) -> Result<T, FetchError> {
        let payload = serde_json::to_vec(body).map_err(|e| FetchError::parse(url, e))?;
        self.execute(Method::POST, url, headers, Some(payload))
            .await
    }

    #[instrument(skip(self, headers, body), fields(method = %method, url = %url))]
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
        body: Option<Vec<u8>>,
    ) -> Result<T, FetchError> {
        Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.gate.await_open().await;
            debug!(attempt, "sending request");

            let mut request = self.client.request(method.clone(), url);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            if let Some(payload) = &body {
                request = request
                    .header(CONTENT_TYPE, "application/json")
                    .body(payload.clone());
            }

            let response = request
                .send()
                .await
                .map_err(|e| FetchError::network(url, e))?;
            let status = response.status().as_u16();

            if status == 429 {
                let delay = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after)
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                let text = response.text().await.unwrap_or_default();

                if attempt >= self.max_attempts {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        "rate limited and out of attempts"
                    );
                    return Err(FetchError::upstream(url, status, text));
                }

                info!(
                    attempt,
                    max_attempts = self.max_attempts,
                    delay_ms = delay.as_millis(),
                    "rate limited - waiting on gate before retry"
                );
                self.gate.signal_limited(delay);
                continue;
            }

            let text = response
                .text()
                .await
                .map_err(|e| FetchError::network(url, e))?;

            if !matches!(status, 200 | 201) {
                debug!(status, "non-success response");
                return Err(FetchError::upstream(url, status, text));
            }

            return serde_json::from_str(&text).map_err(|e| FetchError::parse(url, e));
        }
    }
}
