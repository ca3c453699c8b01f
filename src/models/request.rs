use std::time::{Duration, Instant};

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::client::helpers::{parse_header_name, parse_header_value};
use crate::error::{ApiError, ApiResult};

/// Header names the client reads or writes.
pub mod headers {
    /// Static API key sent on both channels when configured.
    pub const API_KEY: &str = "x-apikey";
    /// Deterministic key attached to POST, PUT and PATCH requests.
    pub const IDEMPOTENCY_KEY: &str = "idempotency-key";
    /// Step-up transaction id echoed on the step-up call and the replay.
    pub const TRANSACTION_ID: &str = "x-transactionid";
}

/// A request as seen by the pipeline.
///
/// The URL is usually a path resolved against the configured base URL; absolute
/// URLs are sent as-is. The path is also the supersession key.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Value>,
    timeout: Option<Duration>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Attach a typed header. Later values replace earlier ones.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach a header from strings, validating both parts.
    pub fn try_header(self, name: &str, value: &str) -> ApiResult<Self> {
        let value = parse_header_value(name, value)?;
        Ok(self.header(parse_header_name(name)?, value))
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize any value into the JSON body.
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> ApiResult<Self> {
        let value = serde_json::to_value(body).map_err(|source| ApiError::Serialization {
            context: "request body",
            source,
        })?;
        Ok(self.with_body(value))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Per-request timeout, `None` until the client resolves its default.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// POST, PUT and PATCH carry an idempotency key.
    pub fn is_mutating(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }
}

/// Per-request record that travels through both pipeline directions.
///
/// It is cloned into refresh and timeout retries so the retry flag survives,
/// while step-up replays start from a fresh record.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub(crate) started_at: Option<Instant>,
    pub(crate) did_retry: bool,
    pub(crate) sent_access_token: Option<String>,
    pub(crate) pending: Option<PendingRequest>,
    /// Set once a re-execution produced the outcome; the nested run already
    /// applied every stage to it.
    pub(crate) settled_by_retry: bool,
}

impl RequestContext {
    pub fn did_retry(&self) -> bool {
        self.did_retry
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub(crate) fn cancel_token(&self) -> Option<&CancellationToken> {
        self.pending.as_ref().map(|p| &p.token)
    }
}

/// Handle to an in-flight entry: key, owner id and the token that aborts it.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub(crate) key: String,
    pub(crate) id: u64,
    pub(crate) token: CancellationToken,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mutating_methods() {
        assert!(RequestDescriptor::post("/a").is_mutating());
        assert!(RequestDescriptor::new(Method::PUT, "/a").is_mutating());
        assert!(RequestDescriptor::new(Method::PATCH, "/a").is_mutating());
        assert!(!RequestDescriptor::get("/a").is_mutating());
        assert!(!RequestDescriptor::new(Method::DELETE, "/a").is_mutating());
        assert!(!RequestDescriptor::new(Method::HEAD, "/a").is_mutating());
    }

    #[test]
    fn test_try_header_rejects_invalid_values() {
        let ok = RequestDescriptor::get("/a").try_header("X-Trace", "abc").unwrap();
        assert_eq!(ok.headers().get("x-trace").unwrap(), "abc");

        let err = RequestDescriptor::get("/a")
            .try_header("X-Trace", "line\nbreak")
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidHeader { .. }));
        assert!(
            RequestDescriptor::get("/a")
                .try_header("bad name", "v")
                .is_err()
        );
    }

    #[test]
    fn test_json_body() {
        #[derive(Serialize)]
        struct Payload {
            id: u32,
        }
        let request = RequestDescriptor::post("/a").json(&Payload { id: 7 }).unwrap();
        assert_eq!(request.body(), Some(&json!({ "id": 7 })));
    }

    #[test]
    fn test_context_defaults() {
        let ctx = RequestContext::default();
        assert!(!ctx.did_retry());
        assert!(ctx.started_at().is_none());
        assert!(ctx.cancel_token().is_none());
    }
}
