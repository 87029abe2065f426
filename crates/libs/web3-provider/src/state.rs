use crate::config::ProviderConfig;
use std::cell::RefCell;
use std::rc::Rc;

/// Process-wide fields the host populates out of band.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessState {
    pub current_account_address: Option<String>,
    pub network_id: u64,
    pub debug: bool,
}

impl Default for ProcessState {
    fn default() -> Self {
        Self { current_account_address: None, network_id: 1, debug: false }
    }
}

impl ProcessState {
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.network_id)
    }
}

/// Shared handle on the [`ProcessState`] owned by one provider instance.
///
/// The host keeps a clone to update network id and debug flag; the response router is the only
/// writer of the account address.
#[derive(Clone, Debug, Default)]
pub struct StateStore {
    inner: Rc<RefCell<ProcessState>>,
}

impl StateStore {
    pub fn new(state: ProcessState) -> Self {
        Self { inner: Rc::new(RefCell::new(state)) }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(ProcessState {
            current_account_address: config.provider.account.clone(),
            network_id: config.provider.network_id,
            debug: config.provider.debug,
        })
    }

    pub fn snapshot(&self) -> ProcessState {
        self.inner.borrow().clone()
    }

    pub fn current_account_address(&self) -> Option<String> {
        self.inner.borrow().current_account_address.clone()
    }

    pub fn network_id(&self) -> u64 {
        self.inner.borrow().network_id
    }

    pub fn debug(&self) -> bool {
        self.inner.borrow().debug
    }

    pub fn set_current_account_address(&self, address: Option<String>) {
        self.inner.borrow_mut().current_account_address = address;
    }

    pub fn set_network_id(&self, network_id: u64) {
        self.inner.borrow_mut().network_id = network_id;
    }

    pub fn set_debug(&self, debug: bool) {
        self.inner.borrow_mut().debug = debug;
    }
}
