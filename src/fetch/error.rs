//! Error types for outbound API calls.
//!
//! Rate limiting never appears here as its own variant: the client absorbs
//! 429 responses through the rate gate and only escalates to
//! [`FetchError::Upstream`] once its attempt budget is spent.

use thiserror::Error;

/// Errors that can occur during a single outbound API call.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a status other than 200/201.
    #[error("upstream returned HTTP {status} for {url}: {body}")]
    Upstream {
        /// The URL that was called.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The raw response body, verbatim.
        body: String,
    },

    /// The response body could not be parsed as the expected structure.
    #[error("failed to parse response from {url}: {source}")]
    Parse {
        /// The URL that was called.
        url: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error calling {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout calling {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl FetchError {
    /// Creates an upstream status error.
    pub fn upstream(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Parse {
            url: url.into(),
            source,
        }
    }

    /// Creates a network error, promoting reqwest timeouts to [`FetchError::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::Timeout { url: url.into() };
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns the upstream HTTP status, if this error carries one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}
