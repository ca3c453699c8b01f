//! Prometheus metrics for client observability.
//!
//! Recording goes through the `metrics` facade, so library users pick their
//! own recorder. [`init_metrics`] installs a Prometheus recorder and returns
//! a handle for rendering the exposition text.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `api_requests_total` - Dispatched requests (labels: method, outcome)
//! - `api_token_refreshes_total` - Refresh attempts (labels: outcome = success | failure | skipped)
//! - `api_requests_superseded_total` - Requests canceled by a newer one to the same path
//! - `api_step_up_challenges_total` - Step-up challenges raised
//! - `api_timeout_retries_total` - Timeout retries issued
//!
//! ## Histograms
//! - `api_request_duration_seconds` - Elapsed time per request (response timing enabled)
//!
//! # Usage
//!
//! ```rust,ignore
//! use api_connector::metrics::init_metrics;
//!
//! let handle = init_metrics()?;
//! // ... issue requests ...
//! println!("{}", handle.render());
//! ```

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use reqwest::Method;
use tracing::info;

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "api_requests_total";
    pub const REQUEST_DURATION_SECONDS: &str = "api_request_duration_seconds";
    pub const TOKEN_REFRESHES_TOTAL: &str = "api_token_refreshes_total";
    pub const REQUESTS_SUPERSEDED_TOTAL: &str = "api_requests_superseded_total";
    pub const STEP_UP_CHALLENGES_TOTAL: &str = "api_step_up_challenges_total";
    pub const TIMEOUT_RETRIES_TOTAL: &str = "api_timeout_retries_total";
}

/// Install the Prometheus recorder and describe every metric.
///
/// # Returns
///
/// A handle whose `render()` yields the current exposition text, or an error
/// message when a global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, String> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))?;

    describe_metrics();

    info!("Prometheus recorder installed");
    Ok(handle)
}

/// Register descriptions with whichever recorder is installed.
pub fn describe_metrics() {
    describe_counter!(
        names::REQUESTS_TOTAL,
        "Total number of dispatched HTTP requests"
    );
    describe_counter!(
        names::TOKEN_REFRESHES_TOTAL,
        "Total number of access token refresh attempts"
    );
    describe_counter!(
        names::REQUESTS_SUPERSEDED_TOTAL,
        "Total number of requests canceled by a newer request to the same path"
    );
    describe_counter!(
        names::STEP_UP_CHALLENGES_TOTAL,
        "Total number of step-up challenges raised"
    );
    describe_counter!(
        names::TIMEOUT_RETRIES_TOTAL,
        "Total number of retries issued after a timeout"
    );

    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "Request duration in seconds, including retries"
    );
}

// =============================================================================
// Counter Recording Functions
// =============================================================================

/// Record one dispatch and how it ended.
pub fn record_request(method: &Method, outcome: &'static str) {
    counter!(names::REQUESTS_TOTAL, "method" => method.to_string(), "outcome" => outcome)
        .increment(1);
}

/// Record a refresh attempt.
pub fn record_token_refresh(outcome: &'static str) {
    counter!(names::TOKEN_REFRESHES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_superseded() {
    counter!(names::REQUESTS_SUPERSEDED_TOTAL).increment(1);
}

pub fn record_step_up_challenge() {
    counter!(names::STEP_UP_CHALLENGES_TOTAL).increment(1);
}

pub fn record_timeout_retry() {
    counter!(names::TIMEOUT_RETRIES_TOTAL).increment(1);
}

// =============================================================================
// Histogram Recording Functions
// =============================================================================

/// Record end-to-end request duration.
pub fn record_request_duration(duration: Duration) {
    histogram!(names::REQUEST_DURATION_SECONDS).record(duration.as_secs_f64());
}
