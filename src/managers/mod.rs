//! Per-table reactive controllers
//!
//! Every manager binds to one table and turns row events into FRR
//! configuration. A [`Handler`] wraps a manager with the behavior they all
//! share: dependency gating against the [`Directory`] and a retry queue for
//! upserts that could not be applied yet.
mod allow_list;
mod interface;
mod peer;
mod peer_group;
mod retry;
mod set_src;
mod store;

pub use allow_list::AllowListManager;
pub use interface::InterfaceManager;
pub use peer::{PeerKind, PeerManager};
pub use peer_group::PeerGroups;
pub use retry::RetryQueue;
pub use set_src::SetSrcManager;
pub use store::StoreManager;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, error, trace, warn};

use crate::directory::{Dependency, Directory, Row, Slot};
use crate::dispatcher::Operation;

/// Result of applying an upsert
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum Outcome {
    /// Event consumed (applied, ignored on purpose, or failed permanently)
    Handled,
    /// Something the event needs isn't known yet, try again later
    NotReady,
}

pub trait Manager {
    /// Table this manager reacts to
    fn slot(&self) -> &Slot;

    /// Rows that must be present before upserts are attempted
    fn dependencies(&self) -> Vec<Dependency> {
        vec![]
    }

    fn apply_upsert(&mut self, key: &str, _row: &Row) -> Outcome {
        warn!("{}: upsert of '{}' is not supported", self.slot(), key);
        Outcome::Handled
    }

    fn apply_remove(&mut self, key: &str) {
        warn!("{}: removal of '{}' is not supported", self.slot(), key);
    }
}

/// Owns a manager and drives it from table events and dependency callbacks
pub struct Handler {
    slot: Slot,
    deps: Vec<Dependency>,
    directory: Rc<Directory>,
    manager: RefCell<Box<dyn Manager>>,
    pending: RefCell<RetryQueue>,
    // Set when dependencies were satisfied while the manager was busy
    replay_requested: Cell<bool>,
}

impl Handler {
    /// Wrap `manager` and register its dependency set with the directory
    pub fn register(directory: Rc<Directory>, manager: Box<dyn Manager>) -> Rc<Handler> {
        let slot = manager.slot().clone();
        let deps = manager.dependencies();
        let handler = Rc::new(Handler {
            slot,
            deps,
            directory: Rc::clone(&directory),
            manager: RefCell::new(manager),
            pending: RefCell::new(RetryQueue::new()),
            replay_requested: Cell::new(false),
        });
        let weak = Rc::downgrade(&handler);
        directory.register(
            &handler.deps,
            Rc::new(move || {
                if let Some(handler) = weak.upgrade() {
                    handler.on_dependencies_satisfied();
                }
            }),
        );
        handler
    }

    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn handle(&self, key: &str, op: &Operation, row: Row) {
        match op {
            Operation::Set => {
                if self.directory.all_dependencies_satisfied(&self.deps) {
                    let outcome = self.manager.borrow_mut().apply_upsert(key, &row);
                    if outcome == Outcome::NotReady {
                        debug!("{}: '{}' is not ready, queued for retry", self.slot, key);
                        self.pending.borrow_mut().push(key.to_string(), row);
                    }
                } else {
                    debug!(
                        "{}: dependencies not satisfied, '{}' queued",
                        self.slot, key
                    );
                    self.pending.borrow_mut().push(key.to_string(), row);
                }
            }
            Operation::Del => self.manager.borrow_mut().apply_remove(key),
            Operation::Other(op) => {
                error!("Invalid operation '{}' for key '{}'", op, key);
            }
        }
        if self.replay_requested.get() {
            self.on_dependencies_satisfied();
        }
    }

    /// Replay queued upserts once the full dependency set resolves
    pub fn on_dependencies_satisfied(&self) {
        let mut manager = match self.manager.try_borrow_mut() {
            Ok(manager) => manager,
            Err(_) => {
                trace!("{}: busy, replay deferred", self.slot);
                self.replay_requested.set(true);
                return;
            }
        };
        loop {
            self.replay_requested.set(false);
            if self.directory.all_dependencies_satisfied(&self.deps) {
                let queued = self.pending.borrow_mut().take();
                if !queued.is_empty() {
                    debug!("{}: retrying {} queued upsert(s)", self.slot, queued.len());
                }
                let mut retry = RetryQueue::new();
                for (key, row) in queued {
                    if manager.apply_upsert(&key, &row) == Outcome::NotReady {
                        retry.push(key, row);
                    }
                }
                self.pending.borrow_mut().prepend(retry);
            }
            if !self.replay_requested.get() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Database;

    /// Records every call and answers NotReady for keys listed in `blocked`
    struct Recorder {
        slot: Slot,
        deps: Vec<Dependency>,
        blocked: Rc<RefCell<Vec<String>>>,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl Manager for Recorder {
        fn slot(&self) -> &Slot {
            &self.slot
        }

        fn dependencies(&self) -> Vec<Dependency> {
            self.deps.clone()
        }

        fn apply_upsert(&mut self, key: &str, _row: &Row) -> Outcome {
            self.calls.borrow_mut().push(format!("set {}", key));
            if self.blocked.borrow().iter().any(|k| k == key) {
                Outcome::NotReady
            } else {
                Outcome::Handled
            }
        }

        fn apply_remove(&mut self, key: &str) {
            self.calls.borrow_mut().push(format!("del {}", key));
        }
    }

    struct Fixture {
        directory: Rc<Directory>,
        handler: Rc<Handler>,
        blocked: Rc<RefCell<Vec<String>>>,
        calls: Rc<RefCell<Vec<String>>>,
    }

    fn fixture() -> Fixture {
        let directory = Rc::new(Directory::new());
        let blocked = Rc::new(RefCell::new(vec![]));
        let calls = Rc::new(RefCell::new(vec![]));
        let manager = Recorder {
            slot: Slot::new(Database::Config, "TEST"),
            deps: vec![Dependency::new(Database::Config, "DEVICE_METADATA", "localhost/bgp_asn")],
            blocked: Rc::clone(&blocked),
            calls: Rc::clone(&calls),
        };
        let handler = Handler::register(Rc::clone(&directory), Box::new(manager));
        Fixture {
            directory,
            handler,
            blocked,
            calls,
        }
    }

    fn asn(directory: &Directory) {
        let mut row = Row::new();
        row.insert("bgp_asn".to_string(), "65100".to_string());
        directory.put(Database::Config, "DEVICE_METADATA", "localhost", row);
    }

    #[test]
    fn test_queue_until_dependencies() {
        let f = fixture();
        for key in &["a", "b", "c"] {
            f.handler.handle(key, &Operation::Set, Row::new());
        }
        assert!(f.calls.borrow().is_empty());
        assert_eq!(f.handler.pending(), 3);

        asn(&f.directory);
        assert_eq!(*f.calls.borrow(), vec!["set a", "set b", "set c"]);
        assert_eq!(f.handler.pending(), 0);
    }

    #[test]
    fn test_not_ready_keeps_relative_order() {
        let f = fixture();
        for key in &["a", "b", "c", "d"] {
            f.handler.handle(key, &Operation::Set, Row::new());
        }
        f.blocked.borrow_mut().extend(vec!["b".to_string(), "d".to_string()]);
        asn(&f.directory);
        assert_eq!(f.handler.pending(), 2);

        f.calls.borrow_mut().clear();
        f.blocked.borrow_mut().clear();
        asn(&f.directory);
        assert_eq!(*f.calls.borrow(), vec!["set b", "set d"]);
        assert_eq!(f.handler.pending(), 0);
    }

    #[test]
    fn test_ready_upsert_is_applied_directly() {
        let f = fixture();
        asn(&f.directory);
        f.blocked.borrow_mut().push("x".to_string());
        f.handler.handle("x", &Operation::Set, Row::new());
        f.handler.handle("y", &Operation::Set, Row::new());
        assert_eq!(*f.calls.borrow(), vec!["set x", "set y"]);
        assert_eq!(f.handler.pending(), 1);
    }

    #[test]
    fn test_remove_and_unknown_operation() {
        let f = fixture();
        f.handler.handle("a", &Operation::Del, Row::new());
        f.handler.handle("a", &Operation::Del, Row::new());
        f.handler.handle("a", &Operation::Other("HSET".to_string()), Row::new());
        assert_eq!(*f.calls.borrow(), vec!["del a", "del a"]);
        assert_eq!(f.handler.pending(), 0);
    }

    /// A manager whose own write satisfies its dependencies
    struct SelfFeeding {
        slot: Slot,
        directory: Rc<Directory>,
        applied: Rc<RefCell<Vec<String>>>,
    }

    impl Manager for SelfFeeding {
        fn slot(&self) -> &Slot {
            &self.slot
        }

        fn dependencies(&self) -> Vec<Dependency> {
            vec![Dependency::new(Database::Local, "feed", "")]
        }

        fn apply_upsert(&mut self, key: &str, _row: &Row) -> Outcome {
            self.applied.borrow_mut().push(key.to_string());
            self.directory.put(Database::Local, "feed", key, Row::new());
            Outcome::Handled
        }
    }

    #[test]
    fn test_reentrant_replay_is_deferred() {
        let directory = Rc::new(Directory::new());
        let applied = Rc::new(RefCell::new(vec![]));
        let handler = Handler::register(
            Rc::clone(&directory),
            Box::new(SelfFeeding {
                slot: Slot::new(Database::Config, "FEED"),
                directory: Rc::clone(&directory),
                applied: Rc::clone(&applied),
            }),
        );
        handler.handle("first", &Operation::Set, Row::new());
        assert_eq!(handler.pending(), 1);

        directory.put(Database::Local, "feed", "seed", Row::new());
        assert_eq!(*applied.borrow(), vec!["first"]);
        assert_eq!(handler.pending(), 0);

        handler.handle("second", &Operation::Set, Row::new());
        assert_eq!(*applied.borrow(), vec!["first", "second"]);
    }
}
