//! HTTP channel: one reqwest client bound to a base URL.
//!
//! The client owns two channels built from the same configuration. The
//! primary one carries every pipeline request; the refresh channel only ever
//! carries the refresh call, so it can never recurse into the 401 handling.

use std::time::Duration;

use reqwest::header::HeaderMap;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::{ApiResponse, ErrorResponse, RequestDescriptor, decode_body};

/// A reqwest client plus the base URL relative paths resolve against.
#[derive(Debug, Clone)]
pub(crate) struct Channel {
    client: reqwest::Client,
    base_url: String,
    label: &'static str,
}

impl Channel {
    pub(crate) fn new(config: &ConnectionConfig, label: &'static str) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            label,
        })
    }

    /// Resolve a request URL: absolute URLs pass through, paths join the base.
    pub(crate) fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send one request and decode the reply.
    ///
    /// Request headers override `defaults`. Any non-2xx reply becomes
    /// `ApiError::Status`; a timeout becomes `ApiError::Timeout`.
    pub(crate) async fn send(
        &self,
        defaults: &HeaderMap,
        request: &RequestDescriptor,
        timeout: Duration,
    ) -> ApiResult<ApiResponse> {
        let url = self.url(request.url());

        let mut headers = defaults.clone();
        for (name, value) in request.headers() {
            headers.insert(name.clone(), value.clone());
        }

        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .headers(headers)
            .timeout(timeout);
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        debug!(channel = self.label, method = %request.method(), %url, "Dispatching request");

        let response = builder
            .send()
            .await
            .map_err(|e| classify(e, request, timeout))?;

        let status = response.status();
        let response_headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify(e, request, timeout))?;
        let body = decode_body(&bytes);

        debug!(channel = self.label, %status, %url, "Response received");

        if status.is_success() {
            Ok(ApiResponse::new(
                status,
                response_headers,
                body,
                request.clone(),
            ))
        } else {
            Err(ApiError::Status(ErrorResponse {
                status,
                headers: response_headers,
                body,
            }))
        }
    }
}

fn classify(error: reqwest::Error, request: &RequestDescriptor, timeout: Duration) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout {
            method: request.method().clone(),
            url: request.url().to_string(),
            timeout,
        }
    } else {
        ApiError::Network {
            method: request.method().clone(),
            url: request.url().to_string(),
            source: error,
        }
    }
}
