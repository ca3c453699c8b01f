//! Request supersession.
//!
//! With `cancel_old_request` enabled, a request to a path that already has a
//! request in flight cancels the older one. Dispatch races the transport
//! against the cancellation token, so the older call settles as `Ok(None)`
//! unless its response already arrived.

use tracing::debug;

use crate::client::Settled;
use crate::client::inflight::InFlightRequestTracker;
use crate::models::{RequestContext, RequestDescriptor};

/// Register the request under its path, canceling any older one.
pub(crate) async fn register(
    tracker: &InFlightRequestTracker,
    request: &RequestDescriptor,
    ctx: &mut RequestContext,
) {
    ctx.pending = Some(tracker.register(request.url()).await);
}

/// Release this request's entry.
///
/// A request canceled during dispatch already settled as `Ok(None)`; one
/// superseded after its response arrived keeps that response.
pub(crate) async fn release(
    tracker: &InFlightRequestTracker,
    ctx: &mut RequestContext,
    settled: Settled,
) -> Settled {
    if let Some(pending) = ctx.pending.take() {
        tracker.release(&pending).await;
        if matches!(settled, Ok(None)) {
            debug!(key = %pending.key, "Request superseded by a newer one");
        }
    }
    settled
}
