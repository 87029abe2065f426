//! Answers a fixed set of read-only methods from the process state, without the channel.

use crate::envelope::{JsonRpcRequest, JsonRpcResponse};
use crate::state::ProcessState;
use serde_json::Value as JsonValue;

pub mod method {
    pub const ETH_ACCOUNTS: &str = "eth_accounts";
    pub const ETH_COINBASE: &str = "eth_coinbase";
    pub const NET_VERSION: &str = "net_version";
    pub const ETH_CHAIN_ID: &str = "eth_chainId";
    pub const ETH_UNINSTALL_FILTER: &str = "eth_uninstallFilter";
    pub const ETH_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachedMethod {
    Accounts,
    Coinbase,
    NetVersion,
    ChainId,
    UninstallFilter,
}

impl CachedMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            method::ETH_ACCOUNTS => Some(Self::Accounts),
            method::ETH_COINBASE => Some(Self::Coinbase),
            method::NET_VERSION => Some(Self::NetVersion),
            method::ETH_CHAIN_ID => Some(Self::ChainId),
            method::ETH_UNINSTALL_FILTER => Some(Self::UninstallFilter),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accounts => method::ETH_ACCOUNTS,
            Self::Coinbase => method::ETH_COINBASE,
            Self::NetVersion => method::NET_VERSION,
            Self::ChainId => method::ETH_CHAIN_ID,
            Self::UninstallFilter => method::ETH_UNINSTALL_FILTER,
        }
    }

    fn answer(self, state: &ProcessState) -> Option<JsonValue> {
        match self {
            Self::Accounts => state
                .current_account_address
                .as_ref()
                .map(|address| JsonValue::Array(vec![JsonValue::String(address.clone())])),
            Self::Coinbase => state.current_account_address.clone().map(JsonValue::String),
            Self::NetVersion => Some(JsonValue::from(state.network_id)),
            Self::ChainId => Some(JsonValue::String(state.chain_id_hex())),
            // Filter teardown is a no-op locally; the host is told separately by the legacy layer.
            Self::UninstallFilter => Some(JsonValue::Bool(true)),
        }
    }
}

/// Bare result for `method`, or `None` when the caller must dispatch.
pub fn try_answer(method: &str, state: &ProcessState) -> Option<JsonValue> {
    CachedMethod::from_name(method)?.answer(state)
}

/// Full JSON-RPC response echoing the request id.
pub fn sync_response(request: &JsonRpcRequest, state: &ProcessState) -> Option<JsonRpcResponse> {
    try_answer(&request.method, state).map(|result| JsonRpcResponse::for_request(request, result))
}
