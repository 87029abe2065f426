use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub const ACCOUNTS_CHANGED: &str = "accountsChanged";

pub type Listener = Rc<dyn Fn(&JsonValue)>;

/// Named listener lists. Registration order is kept and the same listener may be added twice.
#[derive(Default)]
pub struct EventEmitter {
    listeners: RefCell<BTreeMap<String, Vec<Listener>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, name: &str, listener: Listener) {
        self.listeners.borrow_mut().entry(name.to_owned()).or_default().push(listener);
    }

    /// Drops every registration of `listener` under `name`. Identity is pointer identity.
    pub fn remove_listener(&self, name: &str, listener: &Listener) {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(entries) = listeners.get_mut(name) {
            entries.retain(|registered| !Rc::ptr_eq(registered, listener));
        }
    }

    pub fn remove_all_listeners(&self) {
        self.listeners.borrow_mut().clear();
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.borrow().get(name).map_or(0, Vec::len)
    }

    /// Calls the listeners registered at the time of the call, in order. A panicking listener
    /// unwinds through the caller.
    pub fn emit(&self, name: &str, data: &JsonValue) {
        let snapshot = match self.listeners.borrow().get(name) {
            Some(entries) => entries.clone(),
            None => return,
        };
        for listener in snapshot {
            listener(data);
        }
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = self
            .listeners
            .borrow()
            .iter()
            .map(|(name, entries)| (name.clone(), entries.len()))
            .collect::<BTreeMap<_, _>>();
        f.debug_struct("EventEmitter").field("listeners", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder(tag: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Listener {
        let log = Rc::clone(log);
        Rc::new(move |data: &JsonValue| log.borrow_mut().push(format!("{tag}:{data}")))
    }

    #[test]
    fn emits_in_registration_order_with_duplicates() {
        let emitter = EventEmitter::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recorder("a", &log);
        emitter.on(ACCOUNTS_CHANGED, Rc::clone(&a));
        emitter.on(ACCOUNTS_CHANGED, recorder("b", &log));
        emitter.on(ACCOUNTS_CHANGED, a);
        emitter.emit(ACCOUNTS_CHANGED, &json!(["0x1"]));
        assert_eq!(*log.borrow(), vec![r#"a:["0x1"]"#, r#"b:["0x1"]"#, r#"a:["0x1"]"#]);
    }

    #[test]
    fn remove_listener_drops_every_copy() {
        let emitter = EventEmitter::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recorder("a", &log);
        emitter.on("connect", Rc::clone(&a));
        emitter.on("connect", Rc::clone(&a));
        emitter.on("connect", recorder("b", &log));
        emitter.remove_listener("connect", &a);
        emitter.remove_listener("unknown", &a);
        assert_eq!(emitter.listener_count("connect"), 1);
        emitter.emit("connect", &json!(null));
        assert_eq!(*log.borrow(), vec!["b:null"]);
    }

    #[test]
    fn remove_all_listeners_clears_every_name() {
        let emitter = EventEmitter::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        emitter.on("a", recorder("a", &log));
        emitter.on("b", recorder("b", &log));
        emitter.remove_all_listeners();
        emitter.emit("a", &json!(1));
        emitter.emit("b", &json!(2));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn listener_may_register_during_emit() {
        let emitter = Rc::new(EventEmitter::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner = Rc::clone(&emitter);
        let late = recorder("late", &log);
        emitter.on("tick", Rc::new(move |_: &JsonValue| inner.on("tick", Rc::clone(&late))));
        emitter.emit("tick", &json!(1));
        assert!(log.borrow().is_empty());
        assert_eq!(emitter.listener_count("tick"), 2);
    }
}
