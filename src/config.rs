//! Connection configuration.
//!
//! # Configuration Sources
//!
//! A `ConnectionConfig` is usually built in code (struct literal over
//! `Default`), but can also be loaded from environment variables or a `.env`
//! file via [`ConnectionConfig::from_env`].
//!
//! # Feature Flags
//!
//! Every pipeline stage except authorization is opt-in:
//!
//! - `API_AUTO_REFRESH_TOKEN`: Bearer injection and refresh-on-401 (default: true)
//! - `API_USE_IDEMPOTENCY`: Idempotency-Key on POST/PUT/PATCH (default: false)
//! - `API_CANCEL_OLD_REQUEST`: Newer request to the same path cancels the older (default: false)
//! - `API_STEP_UP_AUTH_ENABLED`: 403 + transactionId raises a step-up challenge (default: false)
//! - `API_RETRY_ON_TIMEOUT`: Retry timeouts and 504s with a longer timeout (default: false)
//! - `API_USE_RESPONSE_TIME`: Attach elapsed time to responses (default: false)

use std::env;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::client::helpers::{parse_header_name, parse_header_value};
use crate::error::{ApiError, ApiResult};
use crate::models::headers;

/// Configuration for one API client instance.
///
/// # Example
///
/// ```rust,ignore
/// let config = ConnectionConfig {
///     base_url: "https://api.example.com".to_string(),
///     use_idempotency: true,
///     ..Default::default()
/// };
/// let client = ApiClient::new(config)?;
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    // =========================================================================
    // Transport
    // =========================================================================
    /// Base URL every relative request path is resolved against
    /// Default: "http://localhost:3000"
    pub base_url: String,

    /// Default per-request timeout (default: 3000ms)
    pub timeout: Duration,

    /// Extra default headers for both channels, applied after the built-in ones
    pub headers: Vec<(String, String)>,

    /// Static API key sent as `X-ApiKey` on both channels
    pub api_key: Option<String>,

    // =========================================================================
    // Pipeline Stages
    // =========================================================================
    /// Inject the bearer token and refresh it on 401 (default: true)
    pub auto_refresh_token: bool,

    /// Attach a deterministic Idempotency-Key to POST/PUT/PATCH
    pub use_idempotency: bool,

    /// Cancel an in-flight request when a newer one targets the same path
    pub cancel_old_request: bool,

    /// Turn 403 responses carrying a transaction id into step-up challenges
    pub step_up_auth_enabled: bool,

    /// Retry timeouts and 504s with a multiplied timeout
    pub retry_on_timeout: bool,

    /// Record elapsed time on every response
    pub use_response_time: bool,

    // =========================================================================
    // Endpoints and Retry Tuning
    // =========================================================================
    /// Path of the refresh endpoint (default: "/oauth2/refresh")
    pub refresh_path: String,

    /// Path of the step-up endpoint (default: "/oauth2/stepup")
    pub stepup_path: String,

    /// Factor applied to the previous timeout on each timeout retry (default: 5)
    pub timeout_multiplier: u32,

    /// No retry once the previous timeout exceeds this (default: 60s)
    pub timeout_ceiling: Duration,
}

impl ConnectionConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Config` if a variable fails to parse or the
    /// resulting configuration is invalid.
    pub fn from_env() -> ApiResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let config = Self {
            base_url: env::var("API_BASE_URL").unwrap_or(defaults.base_url),
            timeout: Duration::from_millis(Self::parse_env("API_TIMEOUT_MS", 3000)?),
            headers: Self::parse_headers(),
            api_key: env::var("API_KEY").ok().filter(|k| !k.is_empty()),

            auto_refresh_token: Self::parse_env("API_AUTO_REFRESH_TOKEN", true)?,
            use_idempotency: Self::parse_env("API_USE_IDEMPOTENCY", false)?,
            cancel_old_request: Self::parse_env("API_CANCEL_OLD_REQUEST", false)?,
            step_up_auth_enabled: Self::parse_env("API_STEP_UP_AUTH_ENABLED", false)?,
            retry_on_timeout: Self::parse_env("API_RETRY_ON_TIMEOUT", false)?,
            use_response_time: Self::parse_env("API_USE_RESPONSE_TIME", false)?,

            refresh_path: env::var("API_REFRESH_PATH").unwrap_or(defaults.refresh_path),
            stepup_path: env::var("API_STEPUP_PATH").unwrap_or(defaults.stepup_path),
            timeout_multiplier: Self::parse_env("API_TIMEOUT_MULTIPLIER", 5)?,
            timeout_ceiling: Duration::from_millis(Self::parse_env(
                "API_TIMEOUT_CEILING_MS",
                60_000,
            )?),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Config` if validation fails.
    pub fn validate(&self) -> ApiResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ApiError::Config(format!(
                "base URL must start with http:// or https:// (got '{}')",
                self.base_url
            )));
        }

        if self.timeout.is_zero() {
            return Err(ApiError::Config(
                "timeout must be greater than 0".to_string(),
            ));
        }

        if self.timeout_multiplier == 0 {
            return Err(ApiError::Config(
                "timeout multiplier must be at least 1".to_string(),
            ));
        }

        for (name, path) in [
            ("refresh path", &self.refresh_path),
            ("step-up path", &self.stepup_path),
        ] {
            if !path.starts_with('/') {
                return Err(ApiError::Config(format!(
                    "{name} must start with '/' (got '{path}')"
                )));
            }
        }

        self.default_headers().map_err(|e| ApiError::Config(e.to_string()))?;

        Ok(())
    }

    /// Default headers for both channels.
    ///
    /// JSON `Accept` / `Content-Type` first, then `X-ApiKey`, then the custom
    /// headers (which may override either).
    pub fn default_headers(&self) -> ApiResult<HeaderMap> {
        let json = HeaderValue::from_static("application/json");
        let mut map = HeaderMap::new();
        map.insert(ACCEPT, json.clone());
        map.insert(CONTENT_TYPE, json);

        if let Some(key) = &self.api_key {
            map.insert(
                HeaderName::from_static(headers::API_KEY),
                parse_header_value(headers::API_KEY, key)?,
            );
        }

        for (name, value) in &self.headers {
            map.insert(parse_header_name(name)?, parse_header_value(name, value)?);
        }

        Ok(map)
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> ApiResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| ApiError::Config(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse custom default headers from `API_HEADERS`.
    ///
    /// Format: comma-separated `Name:value` pairs (e.g., "X-Client:web,X-Region:eu").
    /// Entries without a colon are skipped.
    fn parse_headers() -> Vec<(String, String)> {
        env::var("API_HEADERS")
            .ok()
            .map(|raw| parse_header_list(&raw))
            .unwrap_or_default()
    }
}

fn parse_header_list(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|entry| entry.split_once(':'))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

/// Defaults match a local development server.
impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout: Duration::from_millis(3000),
            headers: Vec::new(),
            api_key: None,
            auto_refresh_token: true,
            use_idempotency: false,
            cancel_old_request: false,
            step_up_auth_enabled: false,
            retry_on_timeout: false,
            use_response_time: false,
            refresh_path: "/oauth2/refresh".to_string(),
            stepup_path: "/oauth2/stepup".to_string(),
            timeout_multiplier: 5,
            timeout_ceiling: Duration::from_millis(60_000),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = ConnectionConfig::default();

        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.timeout, Duration::from_millis(3000));
        assert!(config.auto_refresh_token);
        assert!(!config.use_idempotency);
        assert!(!config.cancel_old_request);
        assert!(!config.step_up_auth_enabled);
        assert!(!config.retry_on_timeout);
        assert!(!config.use_response_time);
        assert_eq!(config.refresh_path, "/oauth2/refresh");
        assert_eq!(config.stepup_path, "/oauth2/stepup");
        assert_eq!(config.timeout_multiplier, 5);
        assert_eq!(config.timeout_ceiling, Duration::from_secs(60));
        assert!(config.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_headers_order_and_override() {
        let config = ConnectionConfig {
            api_key: Some("key-1".to_string()),
            headers: vec![
                ("X-Client".to_string(), "web".to_string()),
                ("Accept".to_string(), "text/plain".to_string()),
            ],
            ..Default::default()
        };

        let map = config.default_headers().unwrap();
        assert_eq!(map.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(map.get(ACCEPT).unwrap(), "text/plain");
        assert_eq!(map.get("x-apikey").unwrap(), "key-1");
        assert_eq!(map.get("x-client").unwrap(), "web");
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let config = ConnectionConfig {
            base_url: "localhost:3000".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ApiError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout_and_multiplier() {
        let config = ConnectionConfig {
            timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConnectionConfig {
            timeout_multiplier: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_relative_paths() {
        let config = ConnectionConfig {
            refresh_path: "oauth2/refresh".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("refresh path"));
    }

    #[test]
    fn test_validate_rejects_invalid_headers() {
        let config = ConnectionConfig {
            headers: vec![("X-Bad".to_string(), "line\nbreak".to_string())],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ApiError::Config(_))));
    }

    #[test]
    fn test_parse_header_list() {
        let parsed = parse_header_list("X-Client: web ,X-Region:eu,broken, :empty");
        assert_eq!(
            parsed,
            vec![
                ("X-Client".to_string(), "web".to_string()),
                ("X-Region".to_string(), "eu".to_string()),
            ]
        );
    }
}
