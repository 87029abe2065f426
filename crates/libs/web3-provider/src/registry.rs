use crate::envelope::{CorrelationId, Permission};
use crate::error::ProviderError;
use log::error;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

pub type Settlement = Result<JsonValue, ProviderError>;

/// Legacy `(error, result)` continuation.
pub type LegacyCallback = Box<dyn FnOnce(Option<JsonValue>, Option<JsonValue>)>;

pub type SharedRegistry = Rc<RefCell<PendingRegistry>>;

/// Settling half of a deferred result. Consumed on first use, so a request settles at most once.
#[derive(Debug)]
pub struct Resolver {
    sender: oneshot::Sender<Settlement>,
}

impl Resolver {
    pub fn resolve(self, value: JsonValue) {
        self.settle(Ok(value));
    }

    pub fn reject(self, error: ProviderError) {
        self.settle(Err(error));
    }

    pub fn settle(self, settlement: Settlement) {
        // The caller may have dropped its handle; nobody is left to notify.
        let _ = self.sender.send(settlement);
    }
}

/// Caller-facing handle on an eventual result.
///
/// Await it, or poll it without suspending through [`Deferred::try_take`].
#[derive(Debug)]
pub struct Deferred {
    correlation_id: Option<CorrelationId>,
    receiver: oneshot::Receiver<Settlement>,
    taken: bool,
}

impl Deferred {
    pub fn pair(correlation_id: Option<CorrelationId>) -> (Resolver, Deferred) {
        let (sender, receiver) = oneshot::channel();
        (Resolver { sender }, Deferred { correlation_id, receiver, taken: false })
    }

    /// A handle that is already settled, for answers served without the channel.
    pub fn ready(settlement: Settlement) -> Self {
        let (resolver, deferred) = Self::pair(None);
        resolver.settle(settlement);
        deferred
    }

    /// Id of the outbound request this handle waits on. `None` for locally answered calls.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }

    /// Returns the settlement once it is available. Yields it at most once.
    pub fn try_take(&mut self) -> Option<Settlement> {
        if self.taken {
            return None;
        }
        let settlement = match self.receiver.try_recv() {
            Ok(settlement) => settlement,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => Err(ProviderError::disconnected()),
        };
        self.taken = true;
        Some(settlement)
    }
}

impl Future for Deferred {
    type Output = Settlement;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.taken {
            return Poll::Ready(Err(ProviderError::disconnected()));
        }
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(received) => {
                this.taken = true;
                Poll::Ready(received.unwrap_or_else(|_| Err(ProviderError::disconnected())))
            }
        }
    }
}

/// What a promise descriptor expects back from the host.
#[derive(Debug)]
pub enum Expectation {
    Permission(Permission),
    /// Scan-code permission; the returned string must match the pattern.
    ScanCode(Regex),
    /// New-style JSON-RPC response.
    JsonRpc,
}

/// Fan-in state of one legacy batch call.
pub struct BatchAccumulator {
    expected: usize,
    results: Vec<JsonValue>,
    callback: LegacyCallback,
}

impl BatchAccumulator {
    pub fn new(expected: usize, callback: LegacyCallback) -> Self {
        Self { expected, results: Vec::with_capacity(expected), callback }
    }

    pub fn push(&mut self, item: JsonValue) {
        self.results.push(item);
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn received(&self) -> usize {
        self.results.len()
    }

    pub fn is_complete(&self) -> bool {
        self.results.len() >= self.expected
    }

    /// Hands the results, in arrival order, to the stored callback.
    pub fn finish(self) {
        (self.callback)(None, Some(JsonValue::Array(self.results)));
    }
}

impl fmt::Debug for BatchAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchAccumulator")
            .field("expected", &self.expected)
            .field("results", &self.results)
            .finish_non_exhaustive()
    }
}

pub enum PendingDescriptor {
    Promise { resolver: Resolver, expectation: Expectation },
    LegacyCallback(LegacyCallback),
    LegacyBatch(BatchAccumulator),
}

impl PendingDescriptor {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Promise { expectation: Expectation::JsonRpc, .. } => "promise/json-rpc",
            Self::Promise { expectation: Expectation::ScanCode(_), .. } => "promise/scan-code",
            Self::Promise { expectation: Expectation::Permission(_), .. } => "promise/permission",
            Self::LegacyCallback(_) => "legacy-callback",
            Self::LegacyBatch(_) => "legacy-batch",
        }
    }
}

impl fmt::Debug for PendingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Promise { expectation, .. } => {
                f.debug_struct("Promise").field("expectation", expectation).finish_non_exhaustive()
            }
            Self::LegacyCallback(_) => f.write_str("LegacyCallback"),
            Self::LegacyBatch(batch) => f.debug_tuple("LegacyBatch").field(batch).finish(),
        }
    }
}

/// Correlation id to pending-operation table. Exactly one descriptor per live id.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: HashMap<CorrelationId, PendingDescriptor>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn put(&mut self, id: CorrelationId, descriptor: PendingDescriptor) {
        if let Some(previous) = self.entries.insert(id, descriptor) {
            error!(
                "pending registry collision should not happen for id {id}, replaced {}",
                previous.kind_name()
            );
        }
    }

    pub fn get(&self, id: CorrelationId) -> Option<&PendingDescriptor> {
        self.entries.get(&id)
    }

    pub fn remove(&mut self, id: CorrelationId) -> Option<PendingDescriptor> {
        self.entries.remove(&id)
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<CorrelationId> {
        let mut ids = self.entries.keys().copied().collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn deferred_settles_once() {
        let (resolver, mut deferred) = Deferred::pair(Some(CorrelationId(1)));
        assert!(deferred.try_take().is_none());
        resolver.resolve(json!("0x1"));
        assert_eq!(deferred.try_take().expect("settled").expect("resolved"), json!("0x1"));
        assert!(deferred.try_take().is_none());
    }

    #[test]
    fn dropped_resolver_reports_disconnected() {
        let (resolver, mut deferred) = Deferred::pair(None);
        drop(resolver);
        let err = deferred.try_take().expect("closed").expect_err("must reject");
        assert_eq!(err.kind, ErrorKind::Disconnected);
    }

    #[tokio::test]
    async fn deferred_can_be_awaited() {
        let (resolver, deferred) = Deferred::pair(Some(CorrelationId(2)));
        assert_eq!(deferred.correlation_id(), Some(CorrelationId(2)));
        resolver.reject(ProviderError::cancelled());
        let err = deferred.await.expect_err("rejected");
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }

    #[test]
    fn ready_deferred_is_settled_without_id() {
        let mut deferred = Deferred::ready(Ok(json!(true)));
        assert_eq!(deferred.correlation_id(), None);
        assert_eq!(deferred.try_take().expect("ready").expect("ok"), json!(true));
    }

    #[test]
    fn batch_accumulator_reports_results_in_push_order() {
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let mut batch = BatchAccumulator::new(
            2,
            Box::new(move |err, result| {
                *sink.borrow_mut() = Some((err, result));
            }),
        );
        batch.push(json!("b"));
        assert!(!batch.is_complete());
        batch.push(json!("a"));
        assert!(batch.is_complete());
        batch.finish();
        assert_eq!(*seen.borrow(), Some((None, Some(json!(["b", "a"])))));
    }

    #[test]
    fn registry_put_get_remove() {
        let mut registry = PendingRegistry::new();
        let (resolver, _deferred) = Deferred::pair(Some(CorrelationId(4)));
        registry.put(
            CorrelationId(4),
            PendingDescriptor::Promise { resolver, expectation: Expectation::JsonRpc },
        );
        registry.put(CorrelationId(2), PendingDescriptor::LegacyCallback(Box::new(|_, _| {})));
        assert_eq!(registry.ids(), vec![CorrelationId(2), CorrelationId(4)]);
        assert_eq!(
            registry.get(CorrelationId(4)).map(PendingDescriptor::kind_name),
            Some("promise/json-rpc")
        );
        assert!(registry.remove(CorrelationId(4)).is_some());
        assert!(registry.remove(CorrelationId(4)).is_none());
        assert!(registry.get(CorrelationId(9)).is_none());
        assert_eq!(registry.len(), 1);
    }
}
