use crate::envelope::{
    CorrelationId, InboundEnvelope, JsonRpcCallback, Permission, PermissionResponse,
};
use crate::error::{code, ProviderError};
use crate::events::{EventEmitter, ACCOUNTS_CHANGED};
use crate::registry::{
    BatchAccumulator, Expectation, LegacyCallback, PendingDescriptor, Resolver, SharedRegistry,
};
use crate::state::StateStore;
use log::{debug, warn};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::rc::Rc;

/// What happened to one inbound envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The pending operation settled and its descriptor is gone.
    Settled(CorrelationId),
    /// A batch reply was stored; the batch is still waiting for more.
    Accumulated { id: CorrelationId, received: usize, expected: usize },
    /// Nothing was pending under the id.
    Dropped(CorrelationId),
    /// The envelope kind does not fit the pending descriptor, which stays registered.
    Mismatched(CorrelationId),
    /// Envelope types that carry no correlation id.
    Ignored,
}

enum PermissionWaiter {
    Grant(Resolver, Permission),
    Scan(Resolver, Regex),
}

enum CallbackWaiter {
    Promise(Resolver),
    Single(LegacyCallback),
    Batch(BatchAccumulator),
}

pub struct ResponseRouter {
    registry: SharedRegistry,
    state: StateStore,
    events: Rc<EventEmitter>,
}

impl ResponseRouter {
    pub fn new(registry: SharedRegistry, state: StateStore, events: Rc<EventEmitter>) -> Self {
        Self { registry, state, events }
    }

    pub fn route(&self, envelope: InboundEnvelope) -> RouteOutcome {
        match envelope {
            InboundEnvelope::PermissionResponse(response) => self.route_permission(response),
            InboundEnvelope::JsonRpcCallback(callback) => self.route_callback(callback),
            InboundEnvelope::HistoryStateChanged { .. } => {
                debug!("ignoring history-state-changed");
                RouteOutcome::Ignored
            }
            InboundEnvelope::Unknown => {
                debug!("ignoring inbound message of unknown type");
                RouteOutcome::Ignored
            }
        }
    }

    fn route_permission(&self, response: PermissionResponse) -> RouteOutcome {
        let id = response.message_id;
        let waiter = match self.take(id, "api-response", |descriptor| match descriptor {
            PendingDescriptor::Promise {
                resolver,
                expectation: Expectation::Permission(permission),
            } => Ok(PermissionWaiter::Grant(resolver, permission)),
            PendingDescriptor::Promise { resolver, expectation: Expectation::ScanCode(regex) } => {
                Ok(PermissionWaiter::Scan(resolver, regex))
            }
            other => Err(other),
        }) {
            Ok(waiter) => waiter,
            Err(outcome) => return outcome,
        };

        match waiter {
            PermissionWaiter::Scan(resolver, regex) => {
                if response.permission != Permission::QrCode.as_str() {
                    debug!("scan response {id} echoed permission {:?}", response.permission);
                }
                resolver.settle(scan_settlement(&regex, response.is_allowed, response.data));
            }
            PermissionWaiter::Grant(resolver, permission) => {
                if response.permission != permission.as_str() {
                    debug!(
                        "permission response {id} echoed {:?}, pending {}",
                        response.permission,
                        permission.as_str()
                    );
                }
                if response.is_allowed != Some(true) {
                    resolver.reject(ProviderError::user_rejected());
                    return RouteOutcome::Settled(id);
                }
                let data = response.data.unwrap_or(JsonValue::Null);
                if permission == Permission::Web3 {
                    let selected = data.get(0).and_then(JsonValue::as_str).map(str::to_owned);
                    self.state.set_current_account_address(selected);
                    self.events.emit(ACCOUNTS_CHANGED, &data);
                }
                resolver.resolve(data);
            }
        }
        RouteOutcome::Settled(id)
    }

    fn route_callback(&self, callback: JsonRpcCallback) -> RouteOutcome {
        let id = callback.message_id;
        let waiter = match self.take(id, "web3-send-async-callback", |descriptor| match descriptor {
            PendingDescriptor::Promise { resolver, expectation: Expectation::JsonRpc } => {
                Ok(CallbackWaiter::Promise(resolver))
            }
            PendingDescriptor::LegacyCallback(legacy) => Ok(CallbackWaiter::Single(legacy)),
            PendingDescriptor::LegacyBatch(batch) => Ok(CallbackWaiter::Batch(batch)),
            other => Err(other),
        }) {
            Ok(waiter) => waiter,
            Err(outcome) => return outcome,
        };

        let JsonRpcCallback { error, result, .. } = callback;
        match waiter {
            CallbackWaiter::Promise(resolver) => match error {
                Some(error) if is_unauthorized(&error) => {
                    resolver.reject(ProviderError::unauthorized())
                }
                Some(error) => resolver.reject(ProviderError::passthrough(error)),
                None => {
                    let inner = result
                        .and_then(|mut result| result.get_mut("result").map(JsonValue::take))
                        .unwrap_or(JsonValue::Null);
                    resolver.resolve(inner);
                }
            },
            CallbackWaiter::Single(callback) => callback(error, result),
            CallbackWaiter::Batch(mut batch) => {
                batch.push(error.or(result).unwrap_or(JsonValue::Null));
                if !batch.is_complete() {
                    let (received, expected) = (batch.received(), batch.expected());
                    self.registry.borrow_mut().put(id, PendingDescriptor::LegacyBatch(batch));
                    return RouteOutcome::Accumulated { id, received, expected };
                }
                batch.finish();
            }
        }
        RouteOutcome::Settled(id)
    }

    /// Removes the descriptor for `id` if `extract` accepts it. A refused descriptor goes back
    /// into the registry untouched.
    fn take<T>(
        &self,
        id: CorrelationId,
        inbound: &str,
        extract: impl FnOnce(PendingDescriptor) -> Result<T, PendingDescriptor>,
    ) -> Result<T, RouteOutcome> {
        let removed = self.registry.borrow_mut().remove(id);
        let Some(descriptor) = removed else {
            debug!("dropping {inbound} for unknown id {id}");
            return Err(RouteOutcome::Dropped(id));
        };
        extract(descriptor).map_err(|descriptor| {
            warn!("{inbound} for id {id} does not fit pending {}", descriptor.kind_name());
            self.registry.borrow_mut().put(id, descriptor);
            RouteOutcome::Mismatched(id)
        })
    }
}

fn is_unauthorized(error: &JsonValue) -> bool {
    error.get("code").and_then(JsonValue::as_i64) == Some(code::UNAUTHORIZED)
}

fn scan_settlement(
    regex: &Regex,
    is_allowed: Option<bool>,
    data: Option<JsonValue>,
) -> Result<JsonValue, ProviderError> {
    if is_allowed == Some(false) {
        return Err(ProviderError::user_rejected());
    }
    let candidate = match &data {
        None | Some(JsonValue::Null) | Some(JsonValue::Bool(false)) => None,
        Some(JsonValue::String(text)) if text.is_empty() => None,
        Some(JsonValue::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    };
    let Some(candidate) = candidate else {
        return Err(ProviderError::cancelled());
    };
    if !regex.is_match(&candidate) {
        return Err(ProviderError::no_match());
    }
    Ok(data.unwrap_or(JsonValue::Null))
}
