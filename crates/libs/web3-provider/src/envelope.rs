use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

/// Integer tag linking one outbound request (or one legacy batch) to its inbound response(s).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Permission {
    #[serde(rename = "web3")]
    Web3,
    #[serde(rename = "qr-code")]
    QrCode,
    #[serde(rename = "contact-code")]
    ContactCode,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Web3 => "web3",
            Self::QrCode => "qr-code",
            Self::ContactCode => "contact-code",
        }
    }
}

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_owned()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub id: JsonValue,
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Empty when the caller's object carried no method; the object is still answered or sent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<JsonValue>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<JsonValue>, method: impl Into<String>, params: Option<JsonValue>) -> Self {
        Self { id: id.into(), jsonrpc: jsonrpc_version(), method: method.into(), params }
    }

    /// A request carrying only a method name, the shape the cache responder is probed with.
    pub fn method_only(method: impl Into<String>) -> Self {
        Self::new(JsonValue::Null, method, None)
    }

    /// Best-effort read of an arbitrary legacy payload. Anything that is not a request object
    /// becomes a method-less request keeping whatever `id` it had.
    pub fn from_loose(value: JsonValue) -> Self {
        let id = value.get("id").cloned().unwrap_or(JsonValue::Null);
        serde_json::from_value(value).unwrap_or_else(|_| Self::new(id, String::new(), None))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: JsonValue,
    pub jsonrpc: String,
    pub result: JsonValue,
}

impl JsonRpcResponse {
    pub fn for_request(request: &JsonRpcRequest, result: JsonValue) -> Self {
        Self { id: request.id.clone(), jsonrpc: jsonrpc_version(), result }
    }

    pub fn to_value(&self) -> JsonValue {
        serde_json::json!({ "id": self.id, "jsonrpc": self.jsonrpc, "result": self.result })
    }
}

/// Input of the legacy `sendAsync` entry point: one request object or an ordered batch.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LegacyPayload {
    Batch(Vec<JsonRpcRequest>),
    Single(JsonRpcRequest),
}

impl LegacyPayload {
    /// Method of a single request. A batch has no method of its own.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Single(request) => Some(request.method.as_str()),
            Self::Batch(_) => None,
        }
    }
}

impl From<JsonRpcRequest> for LegacyPayload {
    fn from(request: JsonRpcRequest) -> Self {
        Self::Single(request)
    }
}

impl From<Vec<JsonRpcRequest>> for LegacyPayload {
    fn from(batch: Vec<JsonRpcRequest>) -> Self {
        Self::Batch(batch)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RequestMethod {
    Name(String),
    /// A whole legacy request object passed where a method name belongs.
    Legacy(JsonRpcRequest),
    /// Any other non-string value, also handled as a legacy synchronous call.
    Raw(JsonValue),
}

impl RequestMethod {
    /// `false`, `0` and `""` count as no method at all.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Name(name) => name.is_empty(),
            Self::Legacy(_) => false,
            Self::Raw(value) => match value {
                JsonValue::Null | JsonValue::Bool(false) => true,
                JsonValue::Number(number) => number.as_f64() == Some(0.0),
                _ => false,
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct RequestArguments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<RequestMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<JsonValue>,
}

impl RequestArguments {
    pub fn new(method: impl Into<String>, params: Option<JsonValue>) -> Self {
        Self { method: Some(RequestMethod::Name(method.into())), params }
    }

    pub fn from_value(value: JsonValue) -> Result<Self, ProviderError> {
        serde_json::from_value(value).map_err(|_| ProviderError::invalid_request())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum OutboundEnvelope {
    #[serde(rename = "api-request", rename_all = "camelCase")]
    PermissionRequest {
        permission: Permission,
        message_id: CorrelationId,
        params: JsonMap<String, JsonValue>,
    },
    #[serde(rename = "web3-send-async-read-only", rename_all = "camelCase")]
    ReadOnlyRequest { message_id: CorrelationId, payload: JsonRpcRequest },
}

impl OutboundEnvelope {
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            Self::PermissionRequest { message_id, .. } | Self::ReadOnlyRequest { message_id, .. } => {
                *message_id
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::PermissionRequest { .. } => "api-request",
            Self::ReadOnlyRequest { .. } => "web3-send-async-read-only",
        }
    }

    pub fn to_json(&self) -> Result<String, ProviderError> {
        serde_json::to_string(self)
            .map_err(|err| ProviderError::internal(format!("failed to encode envelope: {err}")))
    }

    pub fn from_json(raw: &str) -> Result<Self, ProviderError> {
        serde_json::from_str(raw)
            .map_err(|err| ProviderError::validation(format!("invalid outbound envelope: {err}")))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResponse {
    pub message_id: CorrelationId,
    #[serde(default)]
    pub permission: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_allowed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JsonRpcCallback {
    pub message_id: CorrelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum InboundEnvelope {
    #[serde(rename = "api-response")]
    PermissionResponse(PermissionResponse),
    #[serde(rename = "web3-send-async-callback")]
    JsonRpcCallback(JsonRpcCallback),
    #[serde(rename = "history-state-changed", rename_all = "camelCase")]
    HistoryStateChanged {
        #[serde(default)]
        nav_state: JsonValue,
    },
    #[serde(other)]
    Unknown,
}

impl InboundEnvelope {
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            Self::PermissionResponse(response) => Some(response.message_id),
            Self::JsonRpcCallback(callback) => Some(callback.message_id),
            Self::HistoryStateChanged { .. } | Self::Unknown => None,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, ProviderError> {
        serde_json::from_str(raw)
            .map_err(|err| ProviderError::validation(format!("invalid inbound message: {err}")))
    }

    pub fn to_json(&self) -> Result<String, ProviderError> {
        serde_json::to_string(self)
            .map_err(|err| ProviderError::internal(format!("failed to encode envelope: {err}")))
    }
}
