use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::RequestDescriptor;
use crate::error::{ApiError, ApiResult};

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
    request: RequestDescriptor,
    duration: Option<Duration>,
}

impl ApiResponse {
    pub(crate) fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Value,
        request: RequestDescriptor,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            request,
            duration: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Decoded body: JSON when parseable, a JSON string otherwise, `Null` when empty.
    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn into_body(self) -> Value {
        self.body
    }

    /// The request exactly as it went out, after every request stage ran.
    pub fn request(&self) -> &RequestDescriptor {
        &self.request
    }

    /// Wall-clock time from the first request stage to settlement.
    ///
    /// Only populated when response timing is enabled.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub(crate) fn set_duration(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }

    /// Deserialize the body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        T::deserialize(&self.body).map_err(|source| ApiError::Serialization {
            context: "response body",
            source,
        })
    }
}

/// Status, headers and decoded body of a non-2xx response.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Decode a raw body: empty becomes `Null`, non-JSON text becomes a string.
pub(crate) fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
