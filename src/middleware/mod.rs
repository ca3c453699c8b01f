//! Request/response pipeline stages.
//!
//! Stages are composed once, from configuration, when a client is built.
//! Request stages run in order before dispatch; response stages run in order
//! over the settled outcome, each one free to pass it through, replace it,
//! or re-execute the original request through the whole pipeline.
//!
//! # Architecture
//!
//! ```text
//! Request → Authorization → Idempotency → Supersession → Timing → Dispatch
//!                                                                     ↓
//! Result  ← Timing ← TimeoutRetry ← StepUp ← Tokens ← SupersessionCleanup
//!                        ↓              ↓        ↓
//!                  re-execute     park +403   refresh + re-execute
//! ```
//!
//! Only enabled stages are installed. Authorization and Tokens follow
//! `auto_refresh_token`; the rest follow their own flags.
//!
//! A re-executed request runs the whole pipeline on its own, so once a stage
//! re-executes, the outer run passes the result through and only Timing
//! still applies (it measures from the first attempt).

pub mod auth;
pub mod idempotency;
pub mod stepup;
pub mod supersede;
pub mod timeout;
pub mod timing;

pub use timeout::TimeoutRetryPolicy;

use crate::client::{ClientInner, Settled};
use crate::config::ConnectionConfig;
use crate::error::ApiResult;
use crate::models::{RequestContext, RequestDescriptor};

/// A stage that shapes the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    /// Bearer token injection
    Authorization,
    /// Idempotency-Key on POST/PUT/PATCH
    Idempotency,
    /// Register in the in-flight tracker, canceling an older request
    Supersession,
    /// Stamp the start time
    Timing,
}

/// A stage that inspects or replaces the settled outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStage {
    /// Release the in-flight entry; canceled requests settle as `Ok(None)`
    SupersessionCleanup,
    /// Capture tokens from 2xx bodies, refresh and retry once on 401
    Tokens,
    /// Park 403 + transactionId as a step-up challenge
    StepUp,
    /// Retry timeouts and 504s with a multiplied timeout
    TimeoutRetry,
    /// Attach the elapsed time
    Timing,
}

/// The ordered stage lists of one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    request: Vec<RequestStage>,
    response: Vec<ResponseStage>,
}

impl Pipeline {
    /// Compose the stages enabled by `config`, in their fixed order.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        let mut request = Vec::new();
        let mut response = Vec::new();

        if config.auto_refresh_token {
            request.push(RequestStage::Authorization);
        }
        if config.use_idempotency {
            request.push(RequestStage::Idempotency);
        }
        if config.cancel_old_request {
            request.push(RequestStage::Supersession);
            response.push(ResponseStage::SupersessionCleanup);
        }
        if config.use_response_time {
            request.push(RequestStage::Timing);
        }

        if config.auto_refresh_token {
            response.push(ResponseStage::Tokens);
        }
        if config.step_up_auth_enabled {
            response.push(ResponseStage::StepUp);
        }
        if config.retry_on_timeout {
            response.push(ResponseStage::TimeoutRetry);
        }
        if config.use_response_time {
            response.push(ResponseStage::Timing);
        }

        Self { request, response }
    }

    pub fn request_stages(&self) -> &[RequestStage] {
        &self.request
    }

    pub fn response_stages(&self) -> &[ResponseStage] {
        &self.response
    }
}

/// The request before and after the request stages ran.
///
/// Retries always start again from `original`.
pub(crate) struct Exchange<'a> {
    pub(crate) original: &'a RequestDescriptor,
    pub(crate) sent: &'a RequestDescriptor,
}

impl RequestStage {
    pub(crate) async fn apply(
        self,
        client: &ClientInner,
        request: &mut RequestDescriptor,
        ctx: &mut RequestContext,
    ) -> ApiResult<()> {
        match self {
            RequestStage::Authorization => auth::authorize(&client.tokens, request, ctx).await,
            RequestStage::Idempotency => idempotency::attach_key(request),
            RequestStage::Supersession => {
                supersede::register(&client.in_flight, request, ctx).await;
                Ok(())
            }
            RequestStage::Timing => {
                timing::stamp(ctx);
                Ok(())
            }
        }
    }
}

impl ResponseStage {
    pub(crate) async fn handle(
        self,
        client: &ClientInner,
        exchange: &Exchange<'_>,
        ctx: &mut RequestContext,
        settled: Settled,
    ) -> Settled {
        if ctx.settled_by_retry && self != ResponseStage::Timing {
            return settled;
        }

        match self {
            ResponseStage::SupersessionCleanup => {
                supersede::release(&client.in_flight, ctx, settled).await
            }
            ResponseStage::Tokens => auth::on_settled(client, exchange, ctx, settled).await,
            ResponseStage::StepUp => stepup::on_settled(&client.step_up, exchange, settled).await,
            ResponseStage::TimeoutRetry => {
                timeout::on_settled(client, exchange, ctx, settled).await
            }
            ResponseStage::Timing => timing::record(ctx, settled),
        }
    }
}
