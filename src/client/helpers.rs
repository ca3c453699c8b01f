//! Helper functions for header handling.

use reqwest::header::{HeaderName, HeaderValue};

use crate::error::{ApiError, ApiResult};

/// Parse a header name, returning an appropriate error on failure.
///
/// Names are case-insensitive and stored lowercase; anything outside the
/// HTTP token grammar (spaces, colons, non-ASCII) is rejected.
pub fn parse_header_name(name: &str) -> ApiResult<HeaderName> {
    HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| {
        tracing::debug!(name, original_error = %e, "Header name conversion failed");
        ApiError::InvalidHeader {
            name: name.to_string(),
            reason: "not a valid HTTP header name".to_string(),
        }
    })
}

/// Parse a header value for the named header.
pub fn parse_header_value(name: &str, value: &str) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        tracing::debug!(name, original_error = %e, "Header value conversion failed");
        ApiError::InvalidHeader {
            name: name.to_string(),
            reason: "value contains characters not allowed in HTTP headers".to_string(),
        }
    })
}

/// `Bearer <token>` authorization value, marked sensitive.
pub fn bearer(token: &str) -> ApiResult<HeaderValue> {
    let mut value = parse_header_value("authorization", &format!("Bearer {token}"))?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_name_valid() {
        assert_eq!(parse_header_name("X-DeviceKey").unwrap(), "x-devicekey");
        assert!(parse_header_name("Idempotency-Key").is_ok());
        assert!(parse_header_name(" X-Padded ").is_ok());
    }

    #[test]
    fn test_parse_header_name_invalid() {
        assert!(parse_header_name("").is_err());
        assert!(parse_header_name("bad name").is_err());
        let err = parse_header_name("colon:name").unwrap_err();
        assert!(err.to_string().contains("colon:name"));
    }

    #[test]
    fn test_parse_header_value() {
        assert!(parse_header_value("x-a", "plain value").is_ok());
        assert!(parse_header_value("x-a", "line\r\nbreak").is_err());
    }

    #[test]
    fn test_bearer_is_sensitive() {
        let value = bearer("abc").unwrap();
        assert_eq!(value, "Bearer abc");
        assert!(value.is_sensitive());
        assert!(bearer("bad\ntoken").is_err());
    }
}
