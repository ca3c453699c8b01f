//! # API Connector
//!
//! A stateful HTTP client façade over reqwest that applies cross-cutting
//! policies to every request, featuring:
//!
//! - **Authentication**: Bearer injection, token capture, single-flight refresh on 401
//! - **Step-Up**: 403 challenges parked, verified, and replayed
//! - **Idempotency**: Deterministic `Idempotency-Key` for POST/PUT/PATCH
//! - **Supersession**: A newer request to the same path cancels the older one
//! - **Resilience**: Timeouts and 504s retried with an escalating timeout
//! - **Observability**: Structured tracing, metrics, optional response timing
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              ApiConnector (named instances)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ApiClient (verbs, step_up, refresh_token, headers)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Request stages (Auth → Idempotency → Supersession → Time)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Response stages (Cleanup → Tokens → StepUp → Timeout)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  reqwest (primary channel, refresh channel)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use api_connector::{ApiConnector, ConnectionConfig, DEFAULT_INSTANCE};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), api_connector::ApiError> {
//!     let connector = ApiConnector::new();
//!     let client = connector
//!         .configure(DEFAULT_INSTANCE, ConnectionConfig::from_env()?)
//!         .await?;
//!
//!     if let Some(response) = client.get("/health").await? {
//!         println!("{}", response.body());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Enable optional stages:
//! ```bash
//! API_USE_IDEMPOTENCY=true API_RETRY_ON_TIMEOUT=true api-probe POST /payments '{"amount":10}'
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod registry;

// Re-exports for convenience
pub use client::{ApiClient, PersistenceError, TokenPersistence};
pub use config::ConnectionConfig;
pub use error::{ApiError, ApiResult};
pub use idempotency::idempotency_key_from;
pub use models::{ApiResponse, ErrorResponse, RequestDescriptor, StepUpChallenge, TokenPair};
pub use registry::{ApiConnector, DEFAULT_INSTANCE};
