use std::time::Duration;

use reqwest::{Method, StatusCode};
use thiserror::Error;

use crate::models::ErrorResponse;

/// Client-wide error type.
///
/// # Response Errors
///
/// Errors carrying a server response are split into specific variants so the
/// response pipeline (and callers) can pattern match on them:
///
/// - `Status` - Any non-2xx response that no stage handled
/// - `Unauthorized` - A 401 that survived one refresh-and-retry cycle
/// - `StepUpRequired` - A 403 carrying a transaction id; a challenge is now pending
///
/// Canceled (superseded) requests are not errors: they settle as `Ok(None)`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error on {method} {url}: {source}")]
    Network {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("timeout of {}ms exceeded on {method} {url}", .timeout.as_millis())]
    Timeout {
        method: Method,
        url: String,
        timeout: Duration,
    },

    #[error("Unauthorized after token refresh: {}", .0.status)]
    Unauthorized(ErrorResponse),

    #[error("Step-up authentication required (transaction {transaction_id})")]
    StepUpRequired {
        transaction_id: String,
        authentication_methods: Option<String>,
        response: ErrorResponse,
    },

    #[error("Request failed with status {}", .0.status)]
    Status(ErrorResponse),

    #[error("No step-up challenge is pending")]
    NoPendingStepUp,

    #[error("Failed to serialize {context}: {source}")]
    Serialization {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ApiError {
    /// The server response attached to this error, if any.
    pub fn response(&self) -> Option<&ErrorResponse> {
        match self {
            ApiError::Unauthorized(response) | ApiError::Status(response) => Some(response),
            ApiError::StepUpRequired { response, .. } => Some(response),
            _ => None,
        }
    }

    /// HTTP status of the attached response, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(|r| r.status)
    }

    /// True for transport timeouts and 504 Gateway Timeout responses.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout { .. })
            || self.status() == Some(StatusCode::GATEWAY_TIMEOUT)
    }

    /// True when no response was received at all.
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network { .. })
    }
}

/// Convenience type alias for Results with ApiError.
pub type ApiResult<T> = Result<T, ApiError>;
