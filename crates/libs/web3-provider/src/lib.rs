//! In-page Ethereum provider that correlates requests over a one-way host message channel.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod events;
pub mod legacy;
pub mod provider;
pub mod registry;
pub mod router;
pub mod state;

pub use bridge::{Bridge, MemoryBridge};
pub use cache::{method, CachedMethod};
pub use config::{ProviderConfig, ProviderSection};
pub use dispatcher::Dispatcher;
pub use envelope::{
    CorrelationId, InboundEnvelope, JsonRpcCallback, JsonRpcRequest, JsonRpcResponse,
    LegacyPayload, OutboundEnvelope, Permission, PermissionResponse, RequestArguments,
    RequestMethod, JSONRPC_VERSION,
};
pub use error::{code as error_code, ErrorKind, ProviderError};
pub use events::{EventEmitter, Listener, ACCOUNTS_CHANGED};
pub use legacy::AsyncDispatch;
pub use provider::{EthereumProvider, RequestReply, StatusApi};
pub use registry::{Deferred, LegacyCallback, PendingRegistry, Settlement};
pub use router::{ResponseRouter, RouteOutcome};
pub use state::{ProcessState, StateStore};
