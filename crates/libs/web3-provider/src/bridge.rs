use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Outbound half of the host channel.
///
/// Delivery is fire-and-forget: the host answers later through
/// [`crate::EthereumProvider::on_message`], possibly out of order.
pub trait Bridge {
    fn post_message(&self, message: &str);
}

/// In-process bridge that queues outbound messages until the embedding host drains them.
#[derive(Clone, Debug, Default)]
pub struct MemoryBridge {
    outbox: Rc<RefCell<VecDeque<String>>>,
}

impl MemoryBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<String> {
        self.outbox.borrow_mut().drain(..).collect()
    }

    pub fn pop(&self) -> Option<String> {
        self.outbox.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.outbox.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outbox.borrow().is_empty()
    }
}

impl Bridge for MemoryBridge {
    fn post_message(&self, message: &str) {
        self.outbox.borrow_mut().push_back(message.to_owned());
    }
}
