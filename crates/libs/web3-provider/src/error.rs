use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

pub mod code {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const DISCONNECTED: i64 = 4900;
}

const INVALID_REQUEST_MESSAGE: &str = "Request is not valid.";
const UNAUTHORIZED_MESSAGE: &str =
    "The requested method and/or account has not been authorized by the user.";
const USER_REJECTED_MESSAGE: &str = "The user rejected the request.";
const HOST_ERROR_MESSAGE: &str = "host reported an error";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    UserRejected,
    Cancelled,
    NoMatch,
    Passthrough,
    Disconnected,
    Internal,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Validation => "ValidationError",
            Self::Unauthorized => "Unauthorized",
            Self::UserRejected => "UserRejectedRequest",
            Self::Cancelled => "Cancelled",
            Self::NoMatch => "NoMatch",
            Self::Passthrough => "HostError",
            Self::Disconnected => "Disconnected",
            Self::Internal => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error surfaced to a caller through a rejected [`crate::Deferred`], a legacy callback, or a
/// direct `Err` return for structurally invalid calls.
#[derive(Clone, Debug, Serialize, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, code: None, message: message.into(), data: None }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }

    pub fn invalid_request() -> Self {
        Self::new(ErrorKind::Validation, INVALID_REQUEST_MESSAGE)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorKind::Unauthorized, UNAUTHORIZED_MESSAGE).with_code(code::UNAUTHORIZED)
    }

    pub fn user_rejected() -> Self {
        Self::new(ErrorKind::UserRejected, USER_REJECTED_MESSAGE).with_code(code::USER_REJECTED)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Cancelled")
    }

    pub fn no_match() -> Self {
        Self::new(ErrorKind::NoMatch, "Doesn't match")
    }

    pub fn disconnected() -> Self {
        Self::new(ErrorKind::Disconnected, "provider dropped before the request settled")
            .with_code(code::DISCONNECTED)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Wraps a host-reported error object without altering it.
    pub fn passthrough(host_error: JsonValue) -> Self {
        let code = host_error.get("code").and_then(JsonValue::as_i64);
        let message = host_error
            .get("message")
            .and_then(JsonValue::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| HOST_ERROR_MESSAGE.to_owned());
        Self { kind: ErrorKind::Passthrough, code, message, data: Some(host_error) }
    }

    /// The verbatim host error, for passthrough errors.
    pub fn host_error(&self) -> Option<&JsonValue> {
        match self.kind {
            ErrorKind::Passthrough => self.data.as_ref(),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stable_codes_for_permission_errors() {
        let rejected = ProviderError::user_rejected();
        assert_eq!(rejected.code, Some(4001));
        assert_eq!(rejected.name(), "UserRejectedRequest");

        let unauthorized = ProviderError::unauthorized();
        assert_eq!(unauthorized.code, Some(4100));
        assert_eq!(unauthorized.name(), "Unauthorized");
    }

    #[test]
    fn passthrough_keeps_host_error_verbatim() {
        let host = json!({ "code": -32000, "message": "header not found", "extra": [1, 2] });
        let err = ProviderError::passthrough(host.clone());
        assert_eq!(err.kind, ErrorKind::Passthrough);
        assert_eq!(err.code, Some(-32000));
        assert_eq!(err.message, "header not found");
        assert_eq!(err.host_error(), Some(&host));
    }

    #[test]
    fn passthrough_without_message_uses_fallback() {
        let err = ProviderError::passthrough(json!("boom"));
        assert_eq!(err.code, None);
        assert_eq!(err.message, HOST_ERROR_MESSAGE);
    }

    #[test]
    fn display_includes_kind_and_message() {
        assert_eq!(ProviderError::no_match().to_string(), "NoMatch: Doesn't match");
    }
}
