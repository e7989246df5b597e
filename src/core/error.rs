//! # Error Handling
//!
//! Two error families live here:
//!
//! - [`GatewayError`] is what the lookup gateway may hand back to its caller. Only
//!   validation failures and rate-limit rejections are ever produced by a lookup;
//!   the remaining variants come from process setup (configuration, I/O).
//! - [`UpstreamError`] describes everything that can go wrong while talking to the
//!   courier search service. It is recorded against the circuit breaker and then
//!   absorbed into a fallback response, so it never crosses the HTTP boundary.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Caller-facing error types for the lookup gateway
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Missing or malformed search input. Never retried.
    #[error("{message}")]
    Validation { message: String },

    /// The client exhausted its quota for the current window
    #[error("rate limited, retry in {}ms", retry_after.as_millis())]
    RateLimited { retry_after: Duration },

    /// Configuration-related errors (invalid config, unreadable file, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// I/O errors (file operations, socket binding, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a rate-limit rejection
    pub fn rate_limited(retry_after: Duration) -> Self {
        Self::RateLimited { retry_after }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Json { .. } => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for logs and metrics
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::Configuration { .. } => "configuration_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Rate-limited responses carry `retry_in_ms` in the body and a whole-second
/// `Retry-After` header (rounded up so clients never retry too early).
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            Self::RateLimited { retry_after } => {
                let retry_in_ms = retry_after.as_millis() as u64;
                let retry_secs = retry_in_ms.div_ceil(1000).max(1);
                let mut response = (
                    status,
                    Json(json!({
                        "message": "rate_limited",
                        "retry_in_ms": retry_in_ms,
                    })),
                )
                    .into_response();
                if let Ok(value) = HeaderValue::from_str(&retry_secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            other => (status, Json(json!({ "message": other.to_string() }))).into_response(),
        }
    }
}

/// Failures while calling the courier search service
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UpstreamError {
    /// Transport-level failure (DNS, connect, TLS, reset)
    #[error("upstream network error: {0}")]
    Network(String),

    /// Upstream answered with a non-success status
    #[error("upstream returned status {status}")]
    Status { status: u16 },

    /// No answer within the configured upstream timeout
    #[error("upstream timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Response body could not be interpreted
    #[error("upstream response could not be decoded: {0}")]
    Decode(String),

    /// Call skipped because the circuit breaker is open
    #[error("circuit breaker is open")]
    BreakerOpen,
}

impl UpstreamError {
    /// Whether this outcome counts against the circuit breaker
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, Self::BreakerOpen)
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
