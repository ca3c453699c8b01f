//! Response time measurement.

use std::time::Instant;

use tracing::debug;

use crate::client::Settled;
use crate::metrics;
use crate::models::RequestContext;

pub(crate) fn stamp(ctx: &mut RequestContext) {
    ctx.started_at = Some(Instant::now());
}

/// Attach the elapsed time to a response; errors are only logged.
pub(crate) fn record(ctx: &RequestContext, settled: Settled) -> Settled {
    let Some(started_at) = ctx.started_at else {
        return settled;
    };
    let elapsed = started_at.elapsed();
    metrics::record_request_duration(elapsed);

    match settled {
        Ok(Some(mut response)) => {
            response.set_duration(elapsed);
            Ok(Some(response))
        }
        other => {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "Request settled without a response");
            other
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::models::{ApiResponse, RequestDescriptor};
    use reqwest::StatusCode;
    use reqwest::header::HeaderMap;
    use serde_json::Value;
    use std::time::Duration;

    fn response() -> ApiResponse {
        ApiResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            Value::Null,
            RequestDescriptor::get("/ok"),
        )
    }

    #[test]
    fn test_duration_attached_after_stamp() {
        let mut ctx = RequestContext::default();
        stamp(&mut ctx);
        std::thread::sleep(Duration::from_millis(5));

        let settled = record(&ctx, Ok(Some(response()))).unwrap().unwrap();
        assert!(settled.duration().unwrap() >= Duration::from_millis(5));
    }

    #[test]
    fn test_no_stamp_no_duration() {
        let ctx = RequestContext::default();
        let settled = record(&ctx, Ok(Some(response()))).unwrap().unwrap();
        assert!(settled.duration().is_none());
    }

    #[test]
    fn test_errors_pass_through() {
        let mut ctx = RequestContext::default();
        stamp(&mut ctx);
        assert!(matches!(
            record(&ctx, Err(ApiError::NoPendingStepUp)),
            Err(ApiError::NoPendingStepUp)
        ));
        assert!(matches!(record(&ctx, Ok(None)), Ok(None)));
    }
}
