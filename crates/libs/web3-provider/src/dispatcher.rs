use crate::bridge::Bridge;
use crate::envelope::{CorrelationId, JsonRpcRequest, OutboundEnvelope, Permission};
use crate::error::ProviderError;
use crate::registry::{
    BatchAccumulator, Deferred, Expectation, LegacyCallback, PendingDescriptor, SharedRegistry,
};
use log::{debug, error};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use std::cell::Cell;
use std::rc::Rc;

/// Mints correlation ids, registers descriptors and posts envelopes on the bridge.
///
/// No retries and no timeout: a request the host never answers stays pending.
pub struct Dispatcher {
    bridge: Rc<dyn Bridge>,
    registry: SharedRegistry,
    next_id: Cell<u64>,
}

impl Dispatcher {
    pub fn new(bridge: Rc<dyn Bridge>, registry: SharedRegistry) -> Self {
        Self { bridge, registry, next_id: Cell::new(0) }
    }

    pub fn next_id(&self) -> CorrelationId {
        let id = self.next_id.get();
        self.next_id.set(id.saturating_add(1));
        CorrelationId(id)
    }

    /// Asks the host for a permission. Resolves with whatever data the host returns.
    pub fn dispatch_permission(
        &self,
        permission: Permission,
        params: JsonMap<String, JsonValue>,
        expectation: Expectation,
    ) -> Deferred {
        let id = self.next_id();
        let envelope = OutboundEnvelope::PermissionRequest { permission, message_id: id, params };
        self.dispatch_promise(id, envelope, expectation)
    }

    /// Forwards a read-only JSON-RPC call whose `id` is the correlation id itself.
    pub fn dispatch_json_rpc(&self, method: &str, params: Option<JsonValue>) -> Deferred {
        let id = self.next_id();
        let payload = JsonRpcRequest::new(id.0, method, params);
        let envelope = OutboundEnvelope::ReadOnlyRequest { message_id: id, payload };
        self.dispatch_promise(id, envelope, Expectation::JsonRpc)
    }

    pub fn dispatch_legacy(
        &self,
        payload: JsonRpcRequest,
        callback: LegacyCallback,
    ) -> CorrelationId {
        let id = self.next_id();
        self.registry.borrow_mut().put(id, PendingDescriptor::LegacyCallback(callback));
        let envelope = OutboundEnvelope::ReadOnlyRequest { message_id: id, payload };
        if let Err(err) = self.post(&envelope) {
            let removed = self.registry.borrow_mut().remove(id);
            if let Some(PendingDescriptor::LegacyCallback(callback)) = removed {
                callback(Some(legacy_error_value(&err)), None);
            }
        }
        id
    }

    /// Sends every item under one shared id; the callback fires once all replies are in.
    pub fn dispatch_legacy_batch(
        &self,
        items: Vec<JsonRpcRequest>,
        callback: LegacyCallback,
    ) -> CorrelationId {
        let id = self.next_id();
        if items.is_empty() {
            BatchAccumulator::new(0, callback).finish();
            return id;
        }
        self.registry
            .borrow_mut()
            .put(id, PendingDescriptor::LegacyBatch(BatchAccumulator::new(items.len(), callback)));
        for payload in items {
            let envelope = OutboundEnvelope::ReadOnlyRequest { message_id: id, payload };
            if let Err(err) = self.post(&envelope) {
                error!("legacy batch {id} item not sent: {err}");
                let removed = self.registry.borrow_mut().remove(id);
                if let Some(PendingDescriptor::LegacyBatch(mut batch)) = removed {
                    batch.push(legacy_error_value(&err));
                    if batch.is_complete() {
                        batch.finish();
                    } else {
                        self.registry.borrow_mut().put(id, PendingDescriptor::LegacyBatch(batch));
                    }
                }
            }
        }
        id
    }

    fn dispatch_promise(
        &self,
        id: CorrelationId,
        envelope: OutboundEnvelope,
        expectation: Expectation,
    ) -> Deferred {
        let (resolver, deferred) = Deferred::pair(Some(id));
        self.registry.borrow_mut().put(id, PendingDescriptor::Promise { resolver, expectation });
        if let Err(err) = self.post(&envelope) {
            let removed = self.registry.borrow_mut().remove(id);
            if let Some(PendingDescriptor::Promise { resolver, .. }) = removed {
                resolver.reject(err);
            }
        }
        deferred
    }

    fn post(&self, envelope: &OutboundEnvelope) -> Result<(), ProviderError> {
        let raw = envelope.to_json()?;
        debug!("posting {} for id {}", envelope.kind(), envelope.correlation_id());
        self.bridge.post_message(&raw);
        Ok(())
    }
}

fn legacy_error_value(err: &ProviderError) -> JsonValue {
    json!({ "code": err.code, "message": err.message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MemoryBridge;
    use crate::registry::PendingRegistry;
    use std::cell::RefCell;

    fn dispatcher() -> (Dispatcher, MemoryBridge, SharedRegistry) {
        let bridge = MemoryBridge::new();
        let registry = PendingRegistry::shared();
        let dispatcher = Dispatcher::new(Rc::new(bridge.clone()), Rc::clone(&registry));
        (dispatcher, bridge, registry)
    }

    fn sent(bridge: &MemoryBridge) -> Vec<OutboundEnvelope> {
        bridge
            .drain()
            .iter()
            .map(|raw| OutboundEnvelope::from_json(raw).expect("decode outbound"))
            .collect()
    }

    #[test]
    fn ids_are_monotonic_from_zero() {
        let (dispatcher, _, _) = dispatcher();
        assert_eq!(dispatcher.next_id(), CorrelationId(0));
        assert_eq!(dispatcher.next_id(), CorrelationId(1));
        assert_eq!(dispatcher.next_id(), CorrelationId(2));
    }

    #[test]
    fn json_rpc_dispatch_uses_one_id_everywhere() {
        let (dispatcher, bridge, registry) = dispatcher();
        let _ = dispatcher.next_id();
        let deferred = dispatcher.dispatch_json_rpc("eth_blockNumber", None);
        let envelopes = sent(&bridge);
        assert_eq!(envelopes.len(), 1);
        let OutboundEnvelope::ReadOnlyRequest { message_id, payload } = &envelopes[0] else {
            panic!("expected read-only request");
        };
        assert_eq!(*message_id, CorrelationId(1));
        assert_eq!(payload.id, json!(1));
        assert_eq!(payload.method, "eth_blockNumber");
        assert_eq!(deferred.correlation_id(), Some(CorrelationId(1)));
        assert!(registry.borrow().contains(CorrelationId(1)));
    }

    #[test]
    fn permission_dispatch_registers_promise() {
        let (dispatcher, bridge, registry) = dispatcher();
        let _deferred = dispatcher.dispatch_permission(
            Permission::Web3,
            JsonMap::new(),
            Expectation::Permission(Permission::Web3),
        );
        let envelopes = sent(&bridge);
        assert!(matches!(
            envelopes[0],
            OutboundEnvelope::PermissionRequest {
                permission: Permission::Web3,
                message_id: CorrelationId(0),
                ..
            }
        ));
        assert_eq!(
            registry.borrow().get(CorrelationId(0)).map(PendingDescriptor::kind_name),
            Some("promise/permission")
        );
    }

    #[test]
    fn batch_items_share_one_id() {
        let (dispatcher, bridge, registry) = dispatcher();
        let id = dispatcher.dispatch_legacy_batch(
            vec![
                JsonRpcRequest::new(10, "eth_gasPrice", None),
                JsonRpcRequest::new(11, "eth_blockNumber", None),
                JsonRpcRequest::new(12, "eth_getBalance", Some(json!(["0xabc", "latest"]))),
            ],
            Box::new(|_, _| {}),
        );
        let envelopes = sent(&bridge);
        assert_eq!(envelopes.len(), 3);
        assert!(envelopes.iter().all(|envelope| envelope.correlation_id() == id));
        let OutboundEnvelope::ReadOnlyRequest { payload, .. } = &envelopes[2] else {
            panic!("expected read-only request");
        };
        assert_eq!(payload.id, json!(12));
        match registry.borrow().get(id) {
            Some(PendingDescriptor::LegacyBatch(batch)) => assert_eq!(batch.expected(), 3),
            other => panic!("expected batch descriptor, got {other:?}"),
        };
    }

    #[test]
    fn empty_batch_completes_without_sending() {
        let (dispatcher, bridge, registry) = dispatcher();
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        dispatcher.dispatch_legacy_batch(
            Vec::new(),
            Box::new(move |err, result| *sink.borrow_mut() = Some((err, result))),
        );
        assert!(bridge.is_empty());
        assert!(registry.borrow().is_empty());
        assert_eq!(*seen.borrow(), Some((None, Some(json!([])))));
    }
}
