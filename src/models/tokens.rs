use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RequestDescriptor;

/// Access/refresh token pair.
///
/// Also the shape read from refresh responses and from any successful
/// response body carrying `accessToken` / `refreshToken`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    /// Both tokens present.
    pub fn is_complete(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }

    /// Extract whichever tokens a response body carries.
    ///
    /// Non-object bodies and non-string token fields yield nothing.
    pub fn from_body(body: &Value) -> Self {
        let field = |name: &str| {
            body.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Self {
            access_token: field("accessToken"),
            refresh_token: field("refreshToken"),
        }
    }
}

/// Body of the refresh call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<&'a str>,
}

/// Body of the step-up call: credentials when both are given, biometric otherwise.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum StepUpCredentials {
    Passcode {
        username: String,
        passcode: String,
    },
    #[serde(rename_all = "camelCase")]
    Biometric {
        #[serde(skip_serializing_if = "Option::is_none")]
        refresh_token: Option<String>,
        authentication_method: &'static str,
    },
}

pub(crate) const BIOMETRIC_METHOD: &str = "BIOMETRIC";

impl StepUpCredentials {
    pub(crate) fn new(
        username: Option<&str>,
        passcode: Option<&str>,
        refresh_token: Option<String>,
    ) -> Self {
        match (username, passcode) {
            (Some(username), Some(passcode)) if !username.is_empty() && !passcode.is_empty() => {
                StepUpCredentials::Passcode {
                    username: username.to_string(),
                    passcode: passcode.to_string(),
                }
            }
            _ => StepUpCredentials::Biometric {
                refresh_token,
                authentication_method: BIOMETRIC_METHOD,
            },
        }
    }
}

/// A pending step-up challenge raised by a 403 carrying a transaction id.
#[derive(Debug, Clone)]
pub struct StepUpChallenge {
    /// Transaction id from the 403 body, stringified
    pub transaction_id: String,
    /// Acceptable methods as advertised by the server, if any
    pub authentication_methods: Option<String>,
    /// The original request, with `X-TransactionId` attached, to replay afterwards
    pub request: RequestDescriptor,
}

/// Read a truthy `transactionId` from a 403 body.
///
/// Strings and numbers qualify; empty strings, zero and other types do not.
pub(crate) fn transaction_id_from(body: &Value) -> Option<String> {
    match body.get("transactionId")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// Read `authenticationMethods`, rendering non-string values as JSON.
pub(crate) fn authentication_methods_from(body: &Value) -> Option<String> {
    match body.get("authenticationMethods")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
