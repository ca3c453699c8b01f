//! Token refresh with a singleflight guard.
//!
//! Concurrent 401s funnel into one mutex. The first holder performs the
//! network call; every waiter then finds an access token different from the
//! one its request was sent with and returns without calling the server again.
//! Only the access token counts: capturing a new refresh token alone does not
//! make a rejected access token valid.
//!
//! ```text
//!  req A ──401──┐                   ┌── lock ── POST /oauth2/refresh ── replace(a2) ──┐
//!  req B ──401──┼─► refresh_if_stale(a1)                                              ├─► retry
//!  req C ──401──┘                   └── wait ── a2 != a1 ── skip ─────────────────────┘
//! ```

use std::time::Duration;

use reqwest::Method;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::ChannelHeaders;
use super::token_store::TokenStore;
use super::transport::Channel;
use crate::config::ConnectionConfig;
use crate::error::ApiResult;
use crate::metrics;
use crate::models::{RefreshRequest, RequestDescriptor, TokenPair};

/// Serializes refresh calls over the dedicated refresh channel.
pub(crate) struct RefreshCoordinator {
    channel: Channel,
    path: String,
    timeout: Duration,
    singleflight: Mutex<()>,
}

impl RefreshCoordinator {
    pub(crate) fn new(config: &ConnectionConfig) -> ApiResult<Self> {
        Ok(Self {
            channel: Channel::new(config, "refresh")?,
            path: config.refresh_path.clone(),
            timeout: config.timeout,
            singleflight: Mutex::new(()),
        })
    }

    /// Refresh unless the stored access token is no longer `rejected`, the
    /// one the failed request was sent with.
    ///
    /// Returns the pair in effect once the caller may retry.
    #[instrument(skip_all)]
    pub(crate) async fn refresh_if_stale(
        &self,
        tokens: &TokenStore,
        headers: &RwLock<ChannelHeaders>,
        rejected: Option<&str>,
    ) -> ApiResult<TokenPair> {
        let _singleflight = self.singleflight.lock().await;

        if tokens.access_token().await.as_deref() != rejected {
            debug!("Access token already replaced by another request");
            metrics::record_token_refresh("skipped");
            return Ok(tokens.snapshot().await);
        }

        self.run(tokens, headers).await
    }

    /// Unconditional refresh, still serialized with in-pipeline refreshes.
    #[instrument(skip(self, tokens, headers))]
    pub(crate) async fn refresh(
        &self,
        tokens: &TokenStore,
        headers: &RwLock<ChannelHeaders>,
    ) -> ApiResult<TokenPair> {
        let _singleflight = self.singleflight.lock().await;
        self.run(tokens, headers).await
    }

    /// Caller must hold the singleflight lock.
    async fn run(
        &self,
        tokens: &TokenStore,
        headers: &RwLock<ChannelHeaders>,
    ) -> ApiResult<TokenPair> {
        let refresh_token = tokens.refresh_token().await;
        let request = RequestDescriptor::new(Method::POST, self.path.as_str()).json(
            &RefreshRequest {
                refresh_token: refresh_token.as_deref(),
            },
        )?;

        let defaults = headers.read().await.refresh.clone();
        let result = self.channel.send(&defaults, &request, self.timeout).await;

        match result {
            Ok(response) => {
                let pair = TokenPair::from_body(response.body());
                if pair.access_token.is_none() {
                    warn!("Refresh response carried no access token");
                }
                tokens.replace(pair.clone()).await;
                metrics::record_token_refresh("success");
                info!("Access token refreshed");
                Ok(pair)
            }
            Err(e) => {
                metrics::record_token_refresh("failure");
                warn!(error = %e, "Token refresh failed");
                Err(e)
            }
        }
    }
}
