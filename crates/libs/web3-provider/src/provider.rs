use crate::bridge::Bridge;
use crate::cache::{self, method};
use crate::config::ProviderConfig;
use crate::dispatcher::Dispatcher;
use crate::envelope::{
    CorrelationId, InboundEnvelope, JsonRpcRequest, JsonRpcResponse, Permission,
    RequestArguments, RequestMethod,
};
use crate::error::ProviderError;
use crate::events::{EventEmitter, Listener};
use crate::registry::{Deferred, Expectation, PendingRegistry, SharedRegistry};
use crate::router::{ResponseRouter, RouteOutcome};
use crate::state::StateStore;
use log::{log, warn, Level};
use regex::Regex;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::fmt;
use std::rc::Rc;

/// Return value of [`EthereumProvider::request`].
#[derive(Debug)]
pub enum RequestReply {
    /// Settles when the host answers, or is already settled for locally answered methods.
    Deferred(Deferred),
    /// A legacy request object passed as the method; answered without suspension.
    Sync(JsonRpcResponse),
}

impl RequestReply {
    pub fn into_deferred(self) -> Deferred {
        match self {
            Self::Deferred(deferred) => deferred,
            Self::Sync(response) => Deferred::ready(Ok(response.to_value())),
        }
    }
}

pub(crate) struct ProviderInner {
    pub(crate) state: StateStore,
    pub(crate) registry: SharedRegistry,
    pub(crate) dispatcher: Dispatcher,
    router: ResponseRouter,
    events: Rc<EventEmitter>,
    network_version: u64,
    chain_id: String,
}

/// The provider object handed to page code.
///
/// Every entry point runs to completion on the calling thread. Results that need the host come
/// back as [`Deferred`] handles and settle inside [`EthereumProvider::on_message`].
#[derive(Clone)]
pub struct EthereumProvider {
    pub(crate) inner: Rc<ProviderInner>,
}

/// Status-specific extensions, reached through [`EthereumProvider::status`].
pub struct StatusApi<'a> {
    provider: &'a EthereumProvider,
}

impl StatusApi<'_> {
    pub fn get_contact_code(&self) -> Deferred {
        self.provider.request_permission(Permission::ContactCode, JsonMap::new())
    }
}

impl EthereumProvider {
    pub fn new(bridge: Rc<dyn Bridge>, state: StateStore) -> Self {
        let registry = PendingRegistry::shared();
        let events = Rc::new(EventEmitter::new());
        let snapshot = state.snapshot();
        let inner = ProviderInner {
            dispatcher: Dispatcher::new(bridge, Rc::clone(&registry)),
            router: ResponseRouter::new(Rc::clone(&registry), state.clone(), Rc::clone(&events)),
            state,
            registry,
            events,
            network_version: snapshot.network_id,
            chain_id: snapshot.chain_id_hex(),
        };
        Self { inner: Rc::new(inner) }
    }

    pub fn from_config(bridge: Rc<dyn Bridge>, config: &ProviderConfig) -> Self {
        Self::new(bridge, StateStore::from_config(config))
    }

    pub fn state(&self) -> &StateStore {
        &self.inner.state
    }

    pub fn is_status(&self) -> bool {
        true
    }

    pub fn is_connected(&self) -> bool {
        true
    }

    /// Network id at construction time.
    pub fn network_version(&self) -> u64 {
        self.inner.network_version
    }

    /// Hex chain id at construction time.
    pub fn chain_id(&self) -> &str {
        &self.inner.chain_id
    }

    pub fn selected_address(&self) -> Option<String> {
        self.inner.state.current_account_address()
    }

    pub fn status(&self) -> StatusApi<'_> {
        StatusApi { provider: self }
    }

    /// Asks the host for account access.
    pub fn enable(&self) -> Deferred {
        self.log_call(format_args!("enable"));
        self.request_permission(Permission::Web3, JsonMap::new())
    }

    pub fn request(&self, args: Option<RequestArguments>) -> Result<RequestReply, ProviderError> {
        match &args {
            Some(args) => self.log_call(format_args!(
                "request: {}",
                serde_json::to_string(args).unwrap_or_default()
            )),
            None => self.log_call(format_args!("request: null")),
        }
        let RequestArguments { method, params } = args.ok_or_else(ProviderError::invalid_request)?;
        let name = match method {
            None => return Err(ProviderError::invalid_request()),
            Some(method) if method.is_blank() => return Err(ProviderError::invalid_request()),
            Some(RequestMethod::Name(name)) => name,
            Some(RequestMethod::Legacy(payload)) => {
                return Ok(RequestReply::Sync(self.send_sync(payload)))
            }
            Some(RequestMethod::Raw(value)) => {
                return Ok(RequestReply::Sync(self.send_sync(JsonRpcRequest::from_loose(value))))
            }
        };

        if name == method::ETH_REQUEST_ACCOUNTS {
            return Ok(RequestReply::Deferred(
                self.request_permission(Permission::Web3, JsonMap::new()),
            ));
        }
        if let Some(result) = cache::try_answer(&name, &self.inner.state.snapshot()) {
            return Ok(RequestReply::Deferred(Deferred::ready(Ok(result))));
        }
        Ok(RequestReply::Deferred(self.inner.dispatcher.dispatch_json_rpc(&name, params)))
    }

    /// Asks the host to scan a code; the scanned string must match `pattern`.
    ///
    /// `pattern` uses the `regex` crate syntax. Lookaround and backreferences are not supported
    /// and fail with a validation error before anything is posted.
    pub fn scan_qr_code(&self, pattern: &str) -> Result<Deferred, ProviderError> {
        let regex = Regex::new(pattern)
            .map_err(|err| ProviderError::validation(format!("invalid scan pattern: {err}")))?;
        let mut params = JsonMap::new();
        params.insert("regex".to_owned(), JsonValue::String(pattern.to_owned()));
        Ok(self.inner.dispatcher.dispatch_permission(
            Permission::QrCode,
            params,
            Expectation::ScanCode(regex),
        ))
    }

    pub fn on(&self, name: &str, listener: Listener) {
        self.inner.events.on(name, listener);
    }

    pub fn remove_listener(&self, name: &str, listener: &Listener) {
        self.inner.events.remove_listener(name, listener);
    }

    pub fn remove_all_listeners(&self) {
        self.inner.events.remove_all_listeners();
    }

    pub fn emit(&self, name: &str, data: &JsonValue) {
        self.inner.events.emit(name, data);
    }

    /// Feeds one serialized host message to the router.
    pub fn on_message(&self, raw: &str) -> Result<RouteOutcome, ProviderError> {
        let envelope = InboundEnvelope::from_json(raw).map_err(|err| {
            warn!("discarding inbound message: {err}");
            err
        })?;
        Ok(self.route(envelope))
    }

    pub fn route(&self, envelope: InboundEnvelope) -> RouteOutcome {
        self.inner.router.route(envelope)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    pub fn pending_ids(&self) -> Vec<CorrelationId> {
        self.inner.registry.borrow().ids()
    }

    pub(crate) fn request_permission(
        &self,
        permission: Permission,
        params: JsonMap<String, JsonValue>,
    ) -> Deferred {
        self.inner.dispatcher.dispatch_permission(
            permission,
            params,
            Expectation::Permission(permission),
        )
    }

    /// Entry-point tracing, raised to `info` while the host debug flag is on.
    pub(crate) fn log_call(&self, args: fmt::Arguments<'_>) {
        let level = if self.inner.state.debug() { Level::Info } else { Level::Trace };
        log!(level, "{args}");
    }
}

impl fmt::Debug for EthereumProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthereumProvider")
            .field("state", &self.inner.state.snapshot())
            .field("pending", &self.pending_ids())
            .field("events", &self.inner.events)
            .finish()
    }
}
