//! Idempotency-Key injection for POST, PUT and PATCH.

use reqwest::header::{HeaderName, HeaderValue};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::idempotency::idempotency_key_from;
use crate::models::{RequestDescriptor, headers};

/// Attach a key derived from the body and URL to mutating requests.
pub(crate) fn attach_key(request: &mut RequestDescriptor) -> ApiResult<()> {
    if !request.is_mutating() {
        return Ok(());
    }

    let key = idempotency_key_from(request.body(), request.url());
    let value = HeaderValue::from_str(&key).map_err(|e| ApiError::InvalidHeader {
        name: headers::IDEMPOTENCY_KEY.to_string(),
        reason: e.to_string(),
    })?;
    debug!(url = request.url(), %key, "Idempotency key attached");
    request
        .headers_mut()
        .insert(HeaderName::from_static(headers::IDEMPOTENCY_KEY), value);
    Ok(())
}
