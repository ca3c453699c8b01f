//! Step-up authentication.
//!
//! A 403 carrying a `transactionId` parks the original request here as a
//! single pending challenge. `step_up` then verifies the user against the
//! step-up endpoint and replays the parked request.
//!
//! ```text
//! POST /payments ── 403 {transactionId} ──► challenge stored ──► Err(StepUpRequired)
//!
//! step_up(user, passcode)
//!   take challenge ──► POST /oauth2/stepup (X-TransactionId) ──► replay POST /payments
//! ```
//!
//! Only one challenge is held at a time; a newer 403 overwrites an unresolved
//! older one.

use reqwest::header::HeaderName;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::ClientInner;
use super::Settled;
use super::helpers::parse_header_value;
use crate::error::ApiError;
use crate::metrics;
use crate::models::{
    RequestContext, RequestDescriptor, StepUpChallenge, StepUpCredentials, headers,
};

/// Holds at most one pending challenge.
#[derive(Debug)]
pub struct StepUpCoordinator {
    pending: Mutex<Option<StepUpChallenge>>,
    path: String,
}

impl StepUpCoordinator {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            pending: Mutex::new(None),
            path: path.into(),
        }
    }

    /// Store a challenge, replacing any unresolved one.
    pub async fn raise(&self, challenge: StepUpChallenge) {
        let transaction_id = challenge.transaction_id.clone();
        let previous = self.pending.lock().await.replace(challenge);

        if let Some(previous) = previous {
            warn!(
                replaced = %previous.transaction_id,
                %transaction_id,
                "Unresolved step-up challenge replaced"
            );
        }
        metrics::record_step_up_challenge();
        info!(%transaction_id, "Step-up challenge raised");
    }

    /// Remove and return the pending challenge.
    pub async fn take(&self) -> Option<StepUpChallenge> {
        self.pending.lock().await.take()
    }

    pub async fn pending(&self) -> Option<StepUpChallenge> {
        self.pending.lock().await.clone()
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl ClientInner {
    /// Resolve the pending challenge and replay its request.
    ///
    /// The challenge is taken up front, so it is cleared whether the
    /// verification succeeds or fails.
    #[instrument(skip_all)]
    pub(crate) async fn resolve_step_up(
        &self,
        username: Option<&str>,
        passcode: Option<&str>,
    ) -> Settled {
        let Some(challenge) = self.step_up.take().await else {
            debug!("Step-up requested without a pending challenge");
            return Err(ApiError::NoPendingStepUp);
        };

        let refresh_token = self.tokens.refresh_token().await;
        let credentials = StepUpCredentials::new(username, passcode, refresh_token);
        let verification = RequestDescriptor::post(self.step_up.path())
            .json(&credentials)?
            .header(
                HeaderName::from_static(headers::TRANSACTION_ID),
                parse_header_value(headers::TRANSACTION_ID, &challenge.transaction_id)?,
            );

        info!(
            transaction_id = %challenge.transaction_id,
            biometric = matches!(credentials, StepUpCredentials::Biometric { .. }),
            "Submitting step-up verification"
        );

        if self
            .execute(verification, RequestContext::default())
            .await?
            .is_none()
        {
            debug!("Step-up verification was superseded");
            return Ok(None);
        }

        info!(
            transaction_id = %challenge.transaction_id,
            url = challenge.request.url(),
            "Step-up verified, replaying original request"
        );
        self.execute(challenge.request, RequestContext::default())
            .await
    }
}
