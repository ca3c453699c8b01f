//! Step-up challenge capture.

use reqwest::StatusCode;
use reqwest::header::HeaderName;
use tracing::warn;

use super::Exchange;
use crate::client::Settled;
use crate::client::helpers::parse_header_value;
use crate::client::stepup::StepUpCoordinator;
use crate::error::ApiError;
use crate::models::{
    StepUpChallenge, authentication_methods_from, headers, transaction_id_from,
};

/// Turn a 403 carrying a transaction id into a pending challenge.
pub(crate) async fn on_settled(
    coordinator: &StepUpCoordinator,
    exchange: &Exchange<'_>,
    settled: Settled,
) -> Settled {
    let response = match settled {
        Err(ApiError::Status(response)) if response.status == StatusCode::FORBIDDEN => response,
        other => return other,
    };

    let Some(transaction_id) = transaction_id_from(&response.body) else {
        return Err(ApiError::Status(response));
    };

    let value = match parse_header_value(headers::TRANSACTION_ID, &transaction_id) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Transaction id unusable as a header, not raising step-up");
            return Err(ApiError::Status(response));
        }
    };

    let authentication_methods = authentication_methods_from(&response.body);
    let request = exchange
        .original
        .clone()
        .header(HeaderName::from_static(headers::TRANSACTION_ID), value);

    coordinator
        .raise(StepUpChallenge {
            transaction_id: transaction_id.clone(),
            authentication_methods: authentication_methods.clone(),
            request,
        })
        .await;

    Err(ApiError::StepUpRequired {
        transaction_id,
        authentication_methods,
        response,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{ErrorResponse, RequestDescriptor};
    use reqwest::header::HeaderMap;
    use serde_json::{Value, json};

    fn forbidden(body: Value) -> Settled {
        Err(ApiError::Status(ErrorResponse {
            status: StatusCode::FORBIDDEN,
            headers: HeaderMap::new(),
            body,
        }))
    }

    #[tokio::test]
    async fn test_forbidden_with_transaction_raises_challenge() {
        let coordinator = StepUpCoordinator::new("/oauth2/stepup");
        let original = RequestDescriptor::post("/payments").with_body(json!({ "amount": 5 }));
        let exchange = Exchange {
            original: &original,
            sent: &original,
        };

        let settled = on_settled(
            &coordinator,
            &exchange,
            forbidden(json!({ "transactionId": 1234, "authenticationMethods": "PASSCODE" })),
        )
        .await;

        match settled {
            Err(ApiError::StepUpRequired {
                transaction_id,
                authentication_methods,
                ..
            }) => {
                assert_eq!(transaction_id, "1234");
                assert_eq!(authentication_methods.as_deref(), Some("PASSCODE"));
            }
            other => panic!("expected StepUpRequired, got {other:?}"),
        }

        let challenge = coordinator.pending().await.unwrap();
        assert_eq!(challenge.request.url(), "/payments");
        assert_eq!(
            challenge.request.headers().get(headers::TRANSACTION_ID).unwrap(),
            "1234"
        );
        assert_eq!(challenge.request.body(), Some(&json!({ "amount": 5 })));
    }

    #[tokio::test]
    async fn test_forbidden_without_transaction_passes_through() {
        let coordinator = StepUpCoordinator::new("/oauth2/stepup");
        let original = RequestDescriptor::get("/secret");
        let exchange = Exchange {
            original: &original,
            sent: &original,
        };

        let settled = on_settled(&coordinator, &exchange, forbidden(json!({ "transactionId": "" }))).await;
        assert!(matches!(settled, Err(ApiError::Status(_))));
        assert!(coordinator.pending().await.is_none());
    }
}
