//! Deprecated `send`, `sendSync` and `sendAsync` entry points, kept for old dapps.

use crate::cache::{self, method};
use crate::envelope::{
    CorrelationId, JsonRpcRequest, JsonRpcResponse, LegacyPayload, Permission, RequestArguments,
};
use crate::error::ProviderError;
use crate::provider::{EthereumProvider, RequestReply};
use crate::registry::{Deferred, LegacyCallback};
use log::warn;
use serde_json::{Map as JsonMap, Value as JsonValue};

/// How [`EthereumProvider::send_async`] handled its payload.
#[derive(Debug)]
pub enum AsyncDispatch {
    /// Served from the cache; the callback already ran.
    Answered,
    /// Posted to the host under this id.
    Dispatched(CorrelationId),
    /// Account request, routed through the permission prompt. The callback is not used.
    Permission(Deferred),
}

impl EthereumProvider {
    /// `params` defaults to an empty list.
    pub fn send(
        &self,
        method: &str,
        params: Option<JsonValue>,
    ) -> Result<RequestReply, ProviderError> {
        self.log_call(format_args!("send (legacy): {method}"));
        let params = params.unwrap_or_else(|| JsonValue::Array(Vec::new()));
        self.request(Some(RequestArguments::new(method, Some(params))))
    }

    /// Answers from the cache or with a null result. Never waits on the host.
    pub fn send_sync(&self, payload: JsonRpcRequest) -> JsonRpcResponse {
        self.log_call(format_args!("sendSync (legacy){}", payload_text(&payload)));
        if payload.method == method::ETH_UNINSTALL_FILTER {
            if let Err(err) = self.send_async(Some(payload.clone().into()), None) {
                warn!("uninstall filter side request not sent: {err}");
            }
        }
        cache::sync_response(&payload, &self.inner.state.snapshot())
            .unwrap_or_else(|| JsonRpcResponse::for_request(&payload, JsonValue::Null))
    }

    /// Without a callback the cache is skipped and the reply is discarded.
    pub fn send_async(
        &self,
        payload: Option<LegacyPayload>,
        callback: Option<LegacyCallback>,
    ) -> Result<AsyncDispatch, ProviderError> {
        match &payload {
            Some(payload) => {
                self.log_call(format_args!("sendAsync (legacy){}", payload_text(payload)))
            }
            None => self.log_call(format_args!("sendAsync (legacy)null")),
        }
        let payload = payload.ok_or_else(ProviderError::invalid_request)?;
        if payload.method() == Some(method::ETH_REQUEST_ACCOUNTS) {
            return Ok(AsyncDispatch::Permission(
                self.request_permission(Permission::Web3, JsonMap::new()),
            ));
        }

        let callback: LegacyCallback = match callback {
            Some(callback) => {
                if let LegacyPayload::Single(request) = &payload {
                    let state = self.inner.state.snapshot();
                    if let Some(response) = cache::sync_response(request, &state) {
                        callback(None, Some(response.to_value()));
                        return Ok(AsyncDispatch::Answered);
                    }
                }
                callback
            }
            None => Box::new(|_, _| {}),
        };

        let dispatcher = &self.inner.dispatcher;
        let id = match payload {
            LegacyPayload::Batch(items) => dispatcher.dispatch_legacy_batch(items, callback),
            LegacyPayload::Single(request) => dispatcher.dispatch_legacy(request, callback),
        };
        Ok(AsyncDispatch::Dispatched(id))
    }
}

fn payload_text(payload: &impl serde::Serialize) -> String {
    serde_json::to_string(payload).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MemoryBridge;
    use crate::envelope::OutboundEnvelope;
    use crate::error::ErrorKind;
    use crate::state::{ProcessState, StateStore};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Seen = Rc<RefCell<Vec<(Option<JsonValue>, Option<JsonValue>)>>>;

    fn provider(account: Option<&str>) -> (EthereumProvider, MemoryBridge) {
        let bridge = MemoryBridge::new();
        let state = StateStore::new(ProcessState {
            current_account_address: account.map(str::to_owned),
            network_id: 3,
            debug: true,
        });
        (EthereumProvider::new(Rc::new(bridge.clone()), state), bridge)
    }

    fn recorder() -> (Seen, LegacyCallback) {
        let seen: Seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, Box::new(move |err, result| sink.borrow_mut().push((err, result))))
    }

    fn outbound(bridge: &MemoryBridge) -> Vec<OutboundEnvelope> {
        bridge
            .drain()
            .iter()
            .map(|raw| OutboundEnvelope::from_json(raw).expect("decode outbound"))
            .collect()
    }

    #[test]
    fn send_defaults_params_to_empty_list() {
        let (provider, bridge) = provider(None);
        let _reply = provider.send("eth_gasPrice", None).expect("send");
        let sent = outbound(&bridge);
        let OutboundEnvelope::ReadOnlyRequest { payload, .. } = &sent[0] else {
            panic!("expected read-only request");
        };
        assert_eq!(payload.method, "eth_gasPrice");
        assert_eq!(payload.params, Some(json!([])));
    }

    #[test]
    fn send_sync_uninstall_filter_answers_true_and_fires_once() {
        let (provider, bridge) = provider(None);
        let response = provider.send_sync(JsonRpcRequest::new(8, "eth_uninstallFilter", None));
        assert_eq!(response.to_value(), json!({ "id": 8, "jsonrpc": "2.0", "result": true }));
        let sent = outbound(&bridge);
        assert_eq!(sent.len(), 1);
        let OutboundEnvelope::ReadOnlyRequest { payload, .. } = &sent[0] else {
            panic!("expected read-only request");
        };
        assert_eq!(payload.method, "eth_uninstallFilter");
        assert_eq!(provider.pending_count(), 1);
    }

    #[test]
    fn send_sync_miss_returns_null_result_without_sending() {
        let (provider, bridge) = provider(None);
        let response = provider.send_sync(JsonRpcRequest::new(2, "eth_accounts", None));
        assert_eq!(response.to_value(), json!({ "id": 2, "jsonrpc": "2.0", "result": null }));
        assert!(bridge.is_empty());
    }

    #[test]
    fn send_sync_non_string_method_yields_null_result() {
        let (provider, bridge) = provider(Some("0xabc"));
        let payload = JsonRpcRequest::from_loose(json!({ "id": 3, "method": 7 }));
        let response = provider.send_sync(payload);
        assert_eq!(response.to_value(), json!({ "id": 3, "jsonrpc": "2.0", "result": null }));
        assert!(bridge.is_empty());
    }

    #[test]
    fn send_async_forwards_method_less_payload() {
        let (provider, bridge) = provider(None);
        let payload = JsonRpcRequest::from_loose(json!({ "id": 6, "params": [] }));
        let dispatch = provider.send_async(Some(payload.into()), None).expect("send_async");
        let AsyncDispatch::Dispatched(id) = dispatch else {
            panic!("expected dispatch");
        };
        let sent = bridge.drain();
        assert_eq!(sent.len(), 1);
        let OutboundEnvelope::ReadOnlyRequest { message_id, payload } =
            OutboundEnvelope::from_json(&sent[0]).expect("decode")
        else {
            panic!("expected read-only request");
        };
        assert_eq!(message_id, id);
        assert_eq!(payload.method, "");
        assert_eq!(payload.params, Some(json!([])));
    }

    #[test]
    fn send_async_without_payload_is_invalid() {
        let (provider, bridge) = provider(None);
        let err = provider.send_async(None, None).expect_err("no payload");
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(bridge.is_empty());
    }

    #[test]
    fn send_async_cache_hit_calls_back_immediately() {
        let (provider, bridge) = provider(Some("0xABC"));
        let (seen, callback) = recorder();
        let outcome = provider
            .send_async(Some(JsonRpcRequest::new(1, "eth_coinbase", None).into()), Some(callback))
            .expect("send_async");
        assert!(matches!(outcome, AsyncDispatch::Answered));
        assert_eq!(
            *seen.borrow(),
            vec![(None, Some(json!({ "id": 1, "jsonrpc": "2.0", "result": "0xABC" })))]
        );
        assert!(bridge.is_empty());
    }

    #[test]
    fn send_async_single_miss_dispatches_with_callback() {
        let (provider, bridge) = provider(None);
        let (seen, callback) = recorder();
        let outcome = provider
            .send_async(Some(JsonRpcRequest::new(4, "eth_getBalance", None).into()), Some(callback))
            .expect("send_async");
        let AsyncDispatch::Dispatched(id) = outcome else {
            panic!("expected dispatch");
        };
        let sent = outbound(&bridge);
        let OutboundEnvelope::ReadOnlyRequest { message_id, payload } = &sent[0] else {
            panic!("expected read-only request");
        };
        assert_eq!(*message_id, id);
        assert_eq!(payload.id, json!(4));

        provider
            .on_message(&format!(
                r#"{{"type":"web3-send-async-callback","messageId":{id},"error":{{"code":-32000}}}}"#
            ))
            .expect("route");
        assert_eq!(*seen.borrow(), vec![(Some(json!({ "code": -32000 })), None)]);
    }

    #[test]
    fn send_async_request_accounts_returns_permission_handle() {
        let (provider, bridge) = provider(Some("0xABC"));
        let (seen, callback) = recorder();
        let outcome = provider
            .send_async(
                Some(JsonRpcRequest::new(1, "eth_requestAccounts", None).into()),
                Some(callback),
            )
            .expect("send_async");
        assert!(matches!(outcome, AsyncDispatch::Permission(_)));
        assert!(matches!(
            outbound(&bridge).as_slice(),
            [OutboundEnvelope::PermissionRequest { permission: Permission::Web3, .. }]
        ));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn send_async_without_callback_skips_cache() {
        let (provider, bridge) = provider(None);
        let outcome = provider
            .send_async(Some(JsonRpcRequest::new(1, "net_version", None).into()), None)
            .expect("send_async");
        assert!(matches!(outcome, AsyncDispatch::Dispatched(_)));
        assert_eq!(bridge.len(), 1);
    }

    #[test]
    fn batch_callback_fires_once_after_every_reply() {
        let (provider, bridge) = provider(None);
        let (seen, callback) = recorder();
        let batch = vec![
            JsonRpcRequest::new(1, "eth_gasPrice", None),
            JsonRpcRequest::new(2, "eth_blockNumber", None),
        ];
        let AsyncDispatch::Dispatched(id) =
            provider.send_async(Some(batch.into()), Some(callback)).expect("send_async")
        else {
            panic!("expected dispatch");
        };
        assert_eq!(outbound(&bridge).len(), 2);

        for result in ["0x2", "0x1"] {
            assert!(seen.borrow().is_empty());
            provider
                .on_message(&format!(
                    r#"{{"type":"web3-send-async-callback","messageId":{id},"result":{{"result":"{result}"}}}}"#
                ))
                .expect("route");
        }
        assert_eq!(
            *seen.borrow(),
            vec![(None, Some(json!([{ "result": "0x2" }, { "result": "0x1" }])))]
        );
        assert_eq!(provider.pending_count(), 0);
    }
}
