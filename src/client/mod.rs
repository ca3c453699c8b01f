//! Stateful HTTP client with a configurable request/response pipeline.
//!
//! This module provides a production-ready façade over reqwest with:
//!
//! - **Token Lifecycle**: Bearer injection, capture from responses, refresh on 401
//! - **Step-Up Authentication**: 403 challenges parked and replayed after verification
//! - **Idempotency**: Deterministic keys for mutating requests
//! - **Supersession**: Newer requests to the same path cancel older ones
//! - **Timeout Escalation**: Timeouts and 504s retried with longer timeouts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         ApiClient                           │
//! │  ┌─────────────────┐  ┌──────────────────────────────────┐  │
//! │  │ State           │  │ Pipeline                         │  │
//! │  │ - TokenStore    │  │ - request stages                 │  │
//! │  │ - StepUp        │  │ - dispatch (primary channel)     │  │
//! │  │ - InFlight      │  │ - response stages (may re-run)   │  │
//! │  └─────────────────┘  └──────────────────────────────────┘  │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ RefreshCoordinator (refresh channel, no pipeline)    │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Structure
//!
//! - `transport` - reqwest channel, URL resolution and response decoding
//! - `token_store` - token pair and persistence hook
//! - `refresh` - singleflight refresh over the refresh channel
//! - `stepup` - pending challenge and the step-up flow
//! - `inflight` - supersession tracking
//! - `helpers` - header parsing
//!
//! # Outcomes
//!
//! Every request settles as one of:
//! - `Ok(Some(response))` for a 2xx
//! - `Ok(None)` when a newer request to the same path canceled it
//! - `Err(ApiError)` otherwise
//!
//! # Example
//!
//! ```rust,ignore
//! let client = ApiClient::new(ConnectionConfig {
//!     base_url: "https://api.example.com".to_string(),
//!     use_idempotency: true,
//!     ..Default::default()
//! })?;
//!
//! if let Some(response) = client.post("/payments", &json!({ "amount": 10 })).await? {
//!     println!("{}", response.status());
//! }
//! ```

pub mod helpers;
pub mod inflight;
pub(crate) mod refresh;
pub mod stepup;
pub mod token_store;
pub(crate) mod transport;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::config::ConnectionConfig;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::middleware::{Exchange, Pipeline, TimeoutRetryPolicy};
use crate::models::{
    ApiResponse, RequestContext, RequestDescriptor, StepUpChallenge, TokenPair, headers,
};

pub use inflight::InFlightRequestTracker;
pub use stepup::StepUpCoordinator;
pub use token_store::{PersistenceError, TokenPersistence, TokenStore};

use helpers::{bearer, parse_header_name, parse_header_value};
use refresh::RefreshCoordinator;
use transport::Channel;

/// Outcome of one pipeline run. `Ok(None)` means superseded.
pub(crate) type Settled = ApiResult<Option<ApiResponse>>;

/// Default headers of the two channels, updated together.
#[derive(Debug, Clone)]
pub(crate) struct ChannelHeaders {
    pub(crate) primary: HeaderMap,
    pub(crate) refresh: HeaderMap,
}

// =============================================================================
// ClientInner
// =============================================================================

/// Shared state behind every clone of an `ApiClient`.
pub(crate) struct ClientInner {
    pub(crate) config: ConnectionConfig,
    pub(crate) channel: Channel,
    pub(crate) headers: RwLock<ChannelHeaders>,
    pub(crate) tokens: TokenStore,
    pub(crate) refresher: RefreshCoordinator,
    pub(crate) step_up: StepUpCoordinator,
    pub(crate) in_flight: InFlightRequestTracker,
    pub(crate) timeout_policy: TimeoutRetryPolicy,
    pub(crate) pipeline: Pipeline,
}

impl ClientInner {
    /// Run a request through the whole pipeline.
    ///
    /// Boxed because response stages re-enter it for retries and replays.
    pub(crate) fn execute<'a>(
        &'a self,
        request: RequestDescriptor,
        mut ctx: RequestContext,
    ) -> Pin<Box<dyn Future<Output = Settled> + Send + 'a>> {
        Box::pin(async move {
            let mut original = request;
            if original.timeout().is_none() {
                original.set_timeout(self.config.timeout);
            }

            let mut sent = original.clone();
            for stage in self.pipeline.request_stages() {
                stage.apply(self, &mut sent, &mut ctx).await?;
            }

            let mut settled = self.dispatch(&sent, &ctx).await;

            let exchange = Exchange {
                original: &original,
                sent: &sent,
            };
            for stage in self.pipeline.response_stages() {
                settled = stage.handle(self, &exchange, &mut ctx, settled).await;
            }
            settled
        })
    }

    /// Send over the primary channel, racing the cancellation token if any.
    async fn dispatch(&self, request: &RequestDescriptor, ctx: &RequestContext) -> Settled {
        let timeout = request.timeout().unwrap_or(self.config.timeout);
        let defaults = self.headers.read().await.primary.clone();
        let send = self.channel.send(&defaults, request, timeout);

        let result = match ctx.cancel_token() {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(method = %request.method(), url = request.url(), "Request canceled");
                    metrics::record_request(request.method(), "canceled");
                    return Ok(None);
                }
                result = send => result,
            },
            None => send.await,
        };

        metrics::record_request(request.method(), outcome_label(&result));
        result.map(Some)
    }
}

fn outcome_label(result: &ApiResult<ApiResponse>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(ApiError::Timeout { .. }) => "timeout",
        Err(ApiError::Network { .. }) => "network_error",
        Err(_) => "error_status",
    }
}

// =============================================================================
// ApiClient
// =============================================================================

/// Cheap-to-clone handle to one configured client.
///
/// # Concurrency
///
/// All clones share tokens, headers, the pending step-up challenge and the
/// in-flight map. Concurrent 401s trigger a single refresh call.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Config` for an invalid configuration and
    /// `ApiError::Client` if the HTTP client cannot be built.
    pub fn new(config: ConnectionConfig) -> ApiResult<Self> {
        Self::build(config, None)
    }

    /// Build a client whose tokens are rehydrated from, and persisted to,
    /// `persistence`.
    ///
    /// Rehydration completes before this returns; its failure is logged and
    /// leaves the client without tokens.
    pub async fn with_persistence(
        config: ConnectionConfig,
        persistence: Arc<dyn TokenPersistence>,
    ) -> ApiResult<Self> {
        let client = Self::build(config, Some(persistence))?;
        client.inner.tokens.rehydrate().await;
        Ok(client)
    }

    #[instrument(skip_all, fields(base_url = %config.base_url))]
    fn build(
        config: ConnectionConfig,
        persistence: Option<Arc<dyn TokenPersistence>>,
    ) -> ApiResult<Self> {
        config.validate()?;

        let defaults = config.default_headers()?;
        let pipeline = Pipeline::from_config(&config);

        info!(
            request_stages = ?pipeline.request_stages(),
            response_stages = ?pipeline.response_stages(),
            timeout_ms = config.timeout.as_millis() as u64,
            "Initializing API client"
        );

        let inner = ClientInner {
            channel: Channel::new(&config, "primary")?,
            headers: RwLock::new(ChannelHeaders {
                primary: defaults.clone(),
                refresh: defaults,
            }),
            tokens: TokenStore::new(persistence),
            refresher: RefreshCoordinator::new(&config)?,
            step_up: StepUpCoordinator::new(config.stepup_path.clone()),
            in_flight: InFlightRequestTracker::new(),
            timeout_policy: TimeoutRetryPolicy::from_config(&config),
            pipeline,
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Run a request through the pipeline.
    #[instrument(skip_all, fields(method = %request.method(), url = request.url()))]
    pub async fn request(&self, request: RequestDescriptor) -> ApiResult<Option<ApiResponse>> {
        self.inner.execute(request, RequestContext::default()).await
    }

    pub async fn get(&self, url: &str) -> ApiResult<Option<ApiResponse>> {
        self.request(RequestDescriptor::new(Method::GET, url)).await
    }

    pub async fn delete(&self, url: &str) -> ApiResult<Option<ApiResponse>> {
        self.request(RequestDescriptor::new(Method::DELETE, url))
            .await
    }

    pub async fn head(&self, url: &str) -> ApiResult<Option<ApiResponse>> {
        self.request(RequestDescriptor::new(Method::HEAD, url)).await
    }

    pub async fn options(&self, url: &str) -> ApiResult<Option<ApiResponse>> {
        self.request(RequestDescriptor::new(Method::OPTIONS, url))
            .await
    }

    pub async fn post<B>(&self, url: &str, body: &B) -> ApiResult<Option<ApiResponse>>
    where
        B: Serialize + ?Sized,
    {
        self.request(RequestDescriptor::new(Method::POST, url).json(body)?)
            .await
    }

    pub async fn put<B>(&self, url: &str, body: &B) -> ApiResult<Option<ApiResponse>>
    where
        B: Serialize + ?Sized,
    {
        self.request(RequestDescriptor::new(Method::PUT, url).json(body)?)
            .await
    }

    pub async fn patch<B>(&self, url: &str, body: &B) -> ApiResult<Option<ApiResponse>>
    where
        B: Serialize + ?Sized,
    {
        self.request(RequestDescriptor::new(Method::PATCH, url).json(body)?)
            .await
    }

    // =========================================================================
    // Tokens and Step-Up
    // =========================================================================

    /// Refresh the access token now, bypassing the pipeline.
    ///
    /// Serialized with refreshes triggered by 401s.
    pub async fn refresh_token(&self) -> ApiResult<TokenPair> {
        self.inner
            .refresher
            .refresh(&self.inner.tokens, &self.inner.headers)
            .await
    }

    /// Verify the pending step-up challenge and replay its request.
    ///
    /// With both `username` and `passcode` the server receives them;
    /// otherwise a biometric assertion carrying the refresh token is sent.
    ///
    /// # Errors
    ///
    /// `ApiError::NoPendingStepUp` when there is nothing to verify (no
    /// network call is made); otherwise whatever the verification call or
    /// the replay fails with.
    pub async fn step_up(
        &self,
        username: Option<&str>,
        passcode: Option<&str>,
    ) -> ApiResult<Option<ApiResponse>> {
        self.inner.resolve_step_up(username, passcode).await
    }

    pub async fn pending_step_up(&self) -> Option<StepUpChallenge> {
        self.inner.step_up.pending().await
    }

    pub async fn tokens(&self) -> TokenPair {
        self.inner.tokens.snapshot().await
    }

    // =========================================================================
    // Headers
    // =========================================================================

    /// Set (`Some`) or remove (`None`) default headers on both channels.
    ///
    /// All entries are validated before any is applied.
    pub async fn update_headers<I, K, V>(&self, updates: I) -> ApiResult<()>
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let parsed = updates
            .into_iter()
            .map(|(name, value)| -> ApiResult<(HeaderName, Option<HeaderValue>)> {
                let name = name.as_ref();
                let value = value
                    .map(|v| parse_header_value(name, v.as_ref()))
                    .transpose()?;
                Ok((parse_header_name(name)?, value))
            })
            .collect::<ApiResult<Vec<_>>>()?;

        let mut channels = self.inner.headers.write().await;
        for (name, value) in parsed {
            match value {
                Some(value) => {
                    channels.primary.insert(name.clone(), value.clone());
                    channels.refresh.insert(name, value);
                }
                None => {
                    channels.primary.remove(&name);
                    channels.refresh.remove(&name);
                }
            }
        }
        debug!(headers = channels.primary.len(), "Default headers updated");
        Ok(())
    }

    /// Current default headers of the primary channel.
    pub async fn default_headers(&self) -> HeaderMap {
        self.inner.headers.read().await.primary.clone()
    }

    /// `X-ApiKey` and `Authorization: Bearer` as they would be sent now.
    ///
    /// Headers whose value is unknown are left out.
    pub async fn get_api_headers(&self) -> ApiResult<HeaderMap> {
        let mut map = HeaderMap::new();
        if let Some(key) = &self.inner.config.api_key {
            map.insert(
                HeaderName::from_static(headers::API_KEY),
                parse_header_value(headers::API_KEY, key)?,
            );
        }
        if let Some(token) = self.inner.tokens.access_token().await {
            map.insert(AUTHORIZATION, bearer(&token)?);
        }
        Ok(map)
    }

    /// Number of requests currently tracked for supersession.
    pub async fn in_flight(&self) -> usize {
        self.inner.in_flight.len().await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url)
            .field("pipeline", &self.inner.pipeline)
            .finish_non_exhaustive()
    }
}
