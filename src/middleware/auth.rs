//! Bearer authorization and token lifecycle.
//!
//! # Request Side
//!
//! The current access token, when there is one, is sent as
//! `Authorization: Bearer <token>`. The token is also recorded on the
//! context so a later 401 can tell whether it was already replaced.
//!
//! # Response Side
//!
//! - **2xx**: `accessToken` / `refreshToken` found in the body are captured
//! - **401**: refresh once (shared with concurrent requests) and re-execute
//!   the original request; a second 401 surfaces as `ApiError::Unauthorized`

use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use tracing::{debug, info, warn};

use super::Exchange;
use crate::client::helpers::bearer;
use crate::client::token_store::TokenStore;
use crate::client::{ClientInner, Settled};
use crate::error::{ApiError, ApiResult};
use crate::models::{ErrorResponse, RequestContext, RequestDescriptor, TokenPair};

/// Attach the bearer token and remember which one was sent.
pub(crate) async fn authorize(
    tokens: &TokenStore,
    request: &mut RequestDescriptor,
    ctx: &mut RequestContext,
) -> ApiResult<()> {
    let access_token = tokens.access_token().await;
    if let Some(token) = &access_token {
        request.headers_mut().insert(AUTHORIZATION, bearer(token)?);
    }
    ctx.sent_access_token = access_token;
    Ok(())
}

pub(crate) async fn on_settled(
    client: &ClientInner,
    exchange: &Exchange<'_>,
    ctx: &mut RequestContext,
    settled: Settled,
) -> Settled {
    match settled {
        Ok(Some(response)) => {
            let update = TokenPair::from_body(response.body());
            if client.tokens.merge(update).await {
                debug!(url = exchange.original.url(), "Tokens updated from response body");
            }
            Ok(Some(response))
        }
        Err(ApiError::Status(response)) if response.status == StatusCode::UNAUTHORIZED => {
            refresh_and_retry(client, exchange, ctx, response).await
        }
        other => other,
    }
}

async fn refresh_and_retry(
    client: &ClientInner,
    exchange: &Exchange<'_>,
    ctx: &mut RequestContext,
    response: ErrorResponse,
) -> Settled {
    let url = exchange.original.url();

    if ctx.did_retry {
        warn!(url, "Still unauthorized after token refresh");
        return Err(ApiError::Unauthorized(response));
    }
    ctx.did_retry = true;

    client
        .refresher
        .refresh_if_stale(
            &client.tokens,
            &client.headers,
            ctx.sent_access_token.as_deref(),
        )
        .await?;

    info!(url, "Retrying request with refreshed token");
    let settled = client.execute(exchange.original.clone(), ctx.clone()).await;
    ctx.settled_by_retry = true;
    settled
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_authorize_without_token_leaves_header_unset() {
        let tokens = TokenStore::new(None);
        let mut request = RequestDescriptor::get("/ok");
        let mut ctx = RequestContext::default();

        authorize(&tokens, &mut request, &mut ctx).await.unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
        assert!(ctx.sent_access_token.is_none());
    }

    #[tokio::test]
    async fn test_authorize_sets_bearer_and_records_token() {
        let tokens = TokenStore::new(None);
        tokens.merge(TokenPair::new("a-1", "r-1")).await;
        let mut request = RequestDescriptor::get("/ok");
        let mut ctx = RequestContext::default();

        authorize(&tokens, &mut request, &mut ctx).await.unwrap();
        assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer a-1");
        assert_eq!(ctx.sent_access_token.as_deref(), Some("a-1"));
    }
}
