mod source;

pub use source::JsonLinesSource;

use std::collections::HashMap;
use std::error;
use std::fmt;
use std::io;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, trace};
use tokio::time::timeout;

use crate::directory::{Row, Slot};
use crate::managers::Handler;

/// Bounded wait for the next batch, so the shutdown flag is noticed
pub const HEARTBEAT: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Set,
    Del,
    Other(String),
}

impl From<&str> for Operation {
    fn from(op: &str) -> Self {
        match op {
            "SET" => Operation::Set,
            "DEL" => Operation::Del,
            other => Operation::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operation::Set => write!(f, "SET"),
            Operation::Del => write!(f, "DEL"),
            Operation::Other(op) => write!(f, "{}", op),
        }
    }
}

/// A row change observed on a subscribed table
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub slot: Slot,
    pub key: String,
    pub op: Operation,
    pub row: Row,
}

#[derive(Debug)]
pub enum TransportError {
    /// Reading from the event feed failed. [reason]
    Io(String),
    /// Event couldn't be decoded. [reason]
    Malformed(String),
    /// Some other issue happened. [reason]
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Transport Error: ")?;
        use TransportError::*;
        match self {
            Io(r) => write!(f, "I/O error [{}]", r)?,
            Malformed(r) => write!(f, "Malformed event [{}]", r)?,
            Other(r) => write!(f, "{}", r)?,
        }
        Ok(())
    }
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        TransportError::Io(error.to_string())
    }
}

impl error::Error for TransportError {
    fn description(&self) -> &str {
        "Transport Error"
    }
}

/// Source of table change notifications
#[async_trait(?Send)]
pub trait EventSource {
    /// Start delivering events for `slot`
    fn subscribe(&mut self, slot: &Slot) -> Result<(), TransportError>;

    /// Wait for the next batch of events on subscribed slots
    async fn wait(&mut self) -> Result<Vec<Event>, TransportError>;
}

/// Routes events from an [`EventSource`] to the managers registered for
/// their table, in registration order
pub struct Dispatcher<S> {
    source: S,
    handlers: HashMap<Slot, Vec<Rc<Handler>>>,
    shutdown: Arc<AtomicBool>,
    heartbeat: Duration,
}

impl<S: EventSource> Dispatcher<S> {
    pub fn new(source: S, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            source,
            handlers: HashMap::new(),
            shutdown,
            heartbeat: HEARTBEAT,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Add a manager, subscribing to its table the first time it's seen
    pub fn add_manager(&mut self, handler: Rc<Handler>) -> Result<(), TransportError> {
        let slot = handler.slot().clone();
        if !self.handlers.contains_key(&slot) {
            self.source.subscribe(&slot)?;
            debug!("Subscribed to {}", slot);
        }
        self.handlers.entry(slot).or_default().push(handler);
        Ok(())
    }

    /// Process events until shutdown is requested. Each batch is finished
    /// before the flag is checked again.
    pub async fn run(&mut self) -> Result<(), TransportError> {
        while !self.shutdown.load(Ordering::SeqCst) {
            let batch = match timeout(self.heartbeat, self.source.wait()).await {
                Err(_) => {
                    trace!("No events within {:?}", self.heartbeat);
                    continue;
                }
                Ok(batch) => batch?,
            };
            for event in batch {
                self.dispatch(event);
            }
        }
        info!("Shutdown requested, event loop stopped");
        Ok(())
    }

    pub fn dispatch(&self, event: Event) {
        debug!(
            "Received message: {} '{}' {} {:?}",
            event.slot, event.key, event.op, event.row
        );
        match self.handlers.get(&event.slot) {
            Some(handlers) => {
                for handler in handlers {
                    handler.handle(&event.key, &event.op, event.row.clone());
                }
            }
            None => trace!("No manager registered for {}", event.slot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use crate::directory::{Database, Directory};
    use crate::managers::{Manager, Outcome};

    struct ScriptedSource {
        subscriptions: Rc<RefCell<Vec<Slot>>>,
        batches: VecDeque<Result<Vec<Event>, TransportError>>,
        shutdown: Arc<AtomicBool>,
    }

    #[async_trait(?Send)]
    impl EventSource for ScriptedSource {
        fn subscribe(&mut self, slot: &Slot) -> Result<(), TransportError> {
            self.subscriptions.borrow_mut().push(slot.clone());
            Ok(())
        }

        async fn wait(&mut self) -> Result<Vec<Event>, TransportError> {
            match self.batches.pop_front() {
                Some(batch) => batch,
                None => {
                    // Script exhausted: ask the loop to stop, then idle
                    self.shutdown.store(true, Ordering::SeqCst);
                    std::future::pending().await
                }
            }
        }
    }

    struct Tagged {
        slot: Slot,
        tag: &'static str,
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl Manager for Tagged {
        fn slot(&self) -> &Slot {
            &self.slot
        }

        fn apply_upsert(&mut self, key: &str, _row: &Row) -> Outcome {
            self.seen.borrow_mut().push(format!("{} set {}", self.tag, key));
            Outcome::Handled
        }

        fn apply_remove(&mut self, key: &str) {
            self.seen.borrow_mut().push(format!("{} del {}", self.tag, key));
        }
    }

    fn event(table: &str, key: &str, op: &str) -> Event {
        Event {
            slot: Slot::new(Database::Config, table),
            key: key.to_string(),
            op: Operation::from(op),
            row: Row::new(),
        }
    }

    #[tokio::test]
    async fn test_fan_out_in_registration_order() {
        let directory = Rc::new(Directory::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let subscriptions = Rc::new(RefCell::new(vec![]));
        let seen = Rc::new(RefCell::new(vec![]));
        let source = ScriptedSource {
            subscriptions: Rc::clone(&subscriptions),
            batches: vec![
                Ok(vec![event("A", "k1", "SET"), event("B", "k2", "SET")]),
                Ok(vec![event("A", "k1", "DEL"), event("C", "k3", "SET")]),
            ]
            .into_iter()
            .collect(),
            shutdown: Arc::clone(&shutdown),
        };
        let mut dispatcher =
            Dispatcher::new(source, Arc::clone(&shutdown)).with_heartbeat(Duration::from_millis(10));
        for &(table, tag) in &[("A", "first"), ("A", "second"), ("B", "third")] {
            let manager = Tagged {
                slot: Slot::new(Database::Config, table),
                tag,
                seen: Rc::clone(&seen),
            };
            dispatcher
                .add_manager(Handler::register(Rc::clone(&directory), Box::new(manager)))
                .unwrap();
        }
        // One subscription per table
        assert_eq!(subscriptions.borrow().len(), 2);

        dispatcher.run().await.unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![
                "first set k1",
                "second set k1",
                "third set k2",
                "first del k1",
                "second del k1",
            ]
        );
    }

    #[tokio::test]
    async fn test_transport_error_is_fatal() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource {
            subscriptions: Rc::new(RefCell::new(vec![])),
            batches: vec![Err(TransportError::Other("select failed".to_string()))]
                .into_iter()
                .collect(),
            shutdown: Arc::clone(&shutdown),
        };
        let mut dispatcher = Dispatcher::new(source, shutdown);
        assert!(dispatcher.run().await.is_err());
    }

    #[tokio::test]
    async fn test_stops_when_flag_is_set() {
        let shutdown = Arc::new(AtomicBool::new(true));
        let source = ScriptedSource {
            subscriptions: Rc::new(RefCell::new(vec![])),
            batches: VecDeque::new(),
            shutdown: Arc::clone(&shutdown),
        };
        let mut dispatcher = Dispatcher::new(source, shutdown);
        dispatcher.run().await.unwrap();
    }
}
