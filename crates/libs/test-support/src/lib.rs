//! Scripted host for driving an [`EthereumProvider`] in tests.

use log::debug;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::rc::Rc;
use web3_provider::{
    CorrelationId, EthereumProvider, MemoryBridge, OutboundEnvelope, Permission, ProcessState,
    RouteOutcome, StateStore,
};

/// How the host answers a permission prompt.
#[derive(Clone, Debug, PartialEq)]
pub enum PermissionReply {
    Grant(JsonValue),
    Deny,
    /// Answer without an `isAllowed` field, the way the scanner reports.
    Unflagged(JsonValue),
}

#[derive(Clone, Debug, PartialEq)]
pub enum MethodReply {
    Result(JsonValue),
    Error(JsonValue),
}

/// Plays the host side of the bridge.
///
/// [`HostSimulator::pump`] reads everything the provider posted and queues a reply for each
/// scripted request. Unscripted requests stay unanswered. Queued replies are handed back with
/// [`HostSimulator::deliver`] in any order the test chooses.
#[derive(Debug)]
pub struct HostSimulator {
    bridge: MemoryBridge,
    permissions: HashMap<Permission, PermissionReply>,
    methods: HashMap<String, MethodReply>,
    sent: Vec<OutboundEnvelope>,
    queued: Vec<String>,
}

impl HostSimulator {
    pub fn new(bridge: MemoryBridge) -> Self {
        Self {
            bridge,
            permissions: HashMap::new(),
            methods: HashMap::new(),
            sent: Vec::new(),
            queued: Vec::new(),
        }
    }

    /// A fresh provider on network `network_id` wired to a new simulator.
    pub fn with_provider(network_id: u64) -> (EthereumProvider, Self) {
        let bridge = MemoryBridge::new();
        let state = StateStore::new(ProcessState { network_id, ..ProcessState::default() });
        let provider = EthereumProvider::new(Rc::new(bridge.clone()), state);
        (provider, Self::new(bridge))
    }

    pub fn on_permission(&mut self, permission: Permission, reply: PermissionReply) -> &mut Self {
        self.permissions.insert(permission, reply);
        self
    }

    pub fn on_method(&mut self, method: &str, reply: MethodReply) -> &mut Self {
        self.methods.insert(method.to_owned(), reply);
        self
    }

    /// Reads the bridge and queues replies. Returns how many envelopes were read.
    pub fn pump(&mut self) -> usize {
        let raw = self.bridge.drain();
        for message in &raw {
            let envelope = match OutboundEnvelope::from_json(message) {
                Ok(envelope) => envelope,
                Err(err) => panic!("provider posted an undecodable envelope: {err}"),
            };
            if let Some(reply) = self.reply_for(&envelope) {
                self.queued.push(reply);
            } else {
                debug!("no script for {} {}", envelope.kind(), envelope.correlation_id());
            }
            self.sent.push(envelope);
        }
        raw.len()
    }

    /// Everything read from the bridge so far, in post order.
    pub fn sent(&self) -> &[OutboundEnvelope] {
        &self.sent
    }

    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// Removes the queued replies so a test can deliver them itself.
    pub fn take_queued(&mut self) -> Vec<String> {
        std::mem::take(&mut self.queued)
    }

    pub fn reverse_queue(&mut self) {
        self.queued.reverse();
    }

    /// Hands every queued reply to the provider, in queue order.
    pub fn deliver(&mut self, provider: &EthereumProvider) -> Vec<RouteOutcome> {
        self.take_queued()
            .iter()
            .map(|raw| match provider.on_message(raw) {
                Ok(outcome) => outcome,
                Err(err) => panic!("provider refused a simulated reply: {err}"),
            })
            .collect()
    }

    /// `pump` followed by `deliver`.
    pub fn run(&mut self, provider: &EthereumProvider) -> Vec<RouteOutcome> {
        self.pump();
        self.deliver(provider)
    }

    fn reply_for(&self, envelope: &OutboundEnvelope) -> Option<String> {
        match envelope {
            OutboundEnvelope::PermissionRequest { permission, message_id, .. } => {
                let reply = self.permissions.get(permission)?;
                Some(match reply {
                    PermissionReply::Grant(data) => {
                        permission_response(*message_id, *permission, Some(true), Some(data.clone()))
                    }
                    PermissionReply::Deny => {
                        permission_response(*message_id, *permission, Some(false), None)
                    }
                    PermissionReply::Unflagged(data) => {
                        permission_response(*message_id, *permission, None, Some(data.clone()))
                    }
                })
            }
            OutboundEnvelope::ReadOnlyRequest { message_id, payload } => {
                Some(match self.methods.get(&payload.method)? {
                    MethodReply::Result(result) => {
                        callback_result(*message_id, &payload.id, result.clone())
                    }
                    MethodReply::Error(error) => callback_error(*message_id, error.clone()),
                })
            }
        }
    }
}

pub fn permission_response(
    id: CorrelationId,
    permission: Permission,
    is_allowed: Option<bool>,
    data: Option<JsonValue>,
) -> String {
    let mut message = json!({
        "type": "api-response",
        "messageId": id,
        "permission": permission.as_str(),
    });
    if let Some(is_allowed) = is_allowed {
        message["isAllowed"] = JsonValue::Bool(is_allowed);
    }
    if let Some(data) = data {
        message["data"] = data;
    }
    message.to_string()
}

/// Successful host reply; `result` is wrapped in a JSON-RPC response echoing `request_id`.
pub fn callback_result(id: CorrelationId, request_id: &JsonValue, result: JsonValue) -> String {
    json!({
        "type": "web3-send-async-callback",
        "messageId": id,
        "result": { "id": request_id, "jsonrpc": "2.0", "result": result },
    })
    .to_string()
}

pub fn callback_error(id: CorrelationId, error: JsonValue) -> String {
    json!({ "type": "web3-send-async-callback", "messageId": id, "error": error }).to_string()
}
