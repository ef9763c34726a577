//! # Directory
//!
//! In-memory cache of every table row the daemon has observed, addressed by
//! [`Slot`] (source database + table name) and row key.
//!
//! Managers declare the rows they need as a set of [`Dependency`] paths and
//! register a callback for it. Each [`Directory::put`] re-checks the
//! registrations that reference the written slot and, after the write is
//! complete, invokes every callback whose whole dependency set is satisfied.
//!
//! Callbacks are invoked synchronously, inside `put`, from a snapshot taken
//! once the internal borrow is released. A callback may therefore call back
//! into the directory (`put`, `remove`, reads) and may trigger further
//! callbacks.
mod node;

pub use node::Node;

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use log::{error, trace};

use crate::utils::ParseError;

/// Field name -> value
pub type Row = BTreeMap<String, String>;

/// Invoked when a registered dependency set is satisfied
pub type Callback = Rc<dyn Fn()>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Database {
    Config,
    State,
    /// Tables derived by the daemon itself
    Local,
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Database::Config => "CONFIG_DB",
            Database::State => "STATE_DB",
            Database::Local => "LOCAL",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Database {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIG_DB" => Ok(Database::Config),
            "STATE_DB" => Ok(Database::State),
            "LOCAL" => Ok(Database::Local),
            other => Err(ParseError::new(format!("Unsupported database '{}'", other))),
        }
    }
}

/// A (source, table) addressed collection of rows
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Slot {
    pub db: Database,
    pub table: String,
}

impl Slot {
    pub fn new(db: Database, table: &str) -> Self {
        Self {
            db,
            table: table.to_string(),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}__{}", self.db, self.table)
    }
}

/// A path into a slot that must resolve before a manager can act.
/// An empty path requires the slot to hold at least one row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub slot: Slot,
    pub path: String,
}

impl Dependency {
    pub fn new(db: Database, table: &str, path: &str) -> Self {
        Self {
            slot: Slot::new(db, table),
            path: path.to_string(),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.slot, self.path)
    }
}

struct Registration {
    deps: Vec<Dependency>,
    callback: Callback,
}

#[derive(Default)]
struct Inner {
    data: HashMap<Slot, BTreeMap<String, Node>>,
    registrations: Vec<Registration>,
    // slot -> indexes into `registrations`, each listed once per slot
    notify: HashMap<Slot, Vec<usize>>,
}

impl Inner {
    fn lookup(&self, slot: &Slot, path: &str) -> Option<Node> {
        let rows = self.data.get(slot)?;
        if path.is_empty() {
            return Some(Node::Branch(rows.clone()));
        }
        let parts: Vec<&str> = path.split('/').collect();
        let (first, rest) = parts.split_first()?;
        rows.get(*first)?.lookup(rest).cloned()
    }

    fn path_exists(&self, slot: &Slot, path: &str) -> bool {
        let rows = match self.data.get(slot) {
            Some(rows) => rows,
            None => return false,
        };
        if path.is_empty() {
            return !rows.is_empty();
        }
        let parts: Vec<&str> = path.split('/').collect();
        match parts.split_first() {
            Some((first, rest)) => rows
                .get(*first)
                .map(|node| node.lookup(rest).is_some())
                .unwrap_or(false),
            None => true,
        }
    }

    fn satisfied(&self, deps: &[Dependency]) -> bool {
        deps.iter().all(|dep| self.path_exists(&dep.slot, &dep.path))
    }

    /// Callbacks referencing `slot` whose dependency set is now satisfied
    fn ready_callbacks(&self, slot: &Slot) -> Vec<Callback> {
        self.notify
            .get(slot)
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|i| &self.registrations[*i])
                    .filter(|reg| self.satisfied(&reg.deps))
                    .map(|reg| Rc::clone(&reg.callback))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Default)]
pub struct Directory {
    inner: RefCell<Inner>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key` and notify every registration on this slot
    /// whose dependencies are satisfied after the write
    pub fn put<V: Into<Node>>(&self, db: Database, table: &str, key: &str, value: V) {
        let slot = Slot::new(db, table);
        let ready = {
            let mut inner = self.inner.borrow_mut();
            inner
                .data
                .entry(slot.clone())
                .or_default()
                .insert(key.to_string(), value.into());
            inner.ready_callbacks(&slot)
        };
        if !ready.is_empty() {
            trace!("{}|{}: notifying {} subscriber(s)", slot, key, ready.len());
        }
        for callback in ready {
            callback();
        }
    }

    pub fn get(&self, db: Database, table: &str, key: &str) -> Option<Node> {
        let inner = self.inner.borrow();
        inner
            .data
            .get(&Slot::new(db, table))
            .and_then(|rows| rows.get(key))
            .cloned()
    }

    pub fn remove(&self, db: Database, table: &str, key: &str) {
        let slot = Slot::new(db, table);
        let mut inner = self.inner.borrow_mut();
        match inner.data.get_mut(&slot) {
            Some(rows) => {
                if rows.remove(key).is_none() {
                    error!(
                        "Directory: Can't remove key '{}' from slot '{}'. The key doesn't exist",
                        key, slot
                    );
                }
            }
            None => error!(
                "Directory: Can't remove key '{}' from slot '{}'. The slot doesn't exist",
                key, slot
            ),
        }
    }

    pub fn remove_slot(&self, db: Database, table: &str) {
        let slot = Slot::new(db, table);
        if self.inner.borrow_mut().data.remove(&slot).is_none() {
            error!(
                "Directory: Can't remove slot '{}'. The slot doesn't exist",
                slot
            );
        }
    }

    pub fn slot_exists(&self, db: Database, table: &str) -> bool {
        self.inner
            .borrow()
            .data
            .contains_key(&Slot::new(db, table))
    }

    /// Row keys of a slot (empty if the slot doesn't exist)
    pub fn keys(&self, db: Database, table: &str) -> Vec<String> {
        self.inner
            .borrow()
            .data
            .get(&Slot::new(db, table))
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Resolve a '/'-separated path: the first component is the row key,
    /// the rest walk into the row. An empty path yields the whole slot.
    pub fn get_path(&self, db: Database, table: &str, path: &str) -> Option<Node> {
        self.inner.borrow().lookup(&Slot::new(db, table), path)
    }

    pub fn path_exists(&self, db: Database, table: &str, path: &str) -> bool {
        self.inner
            .borrow()
            .path_exists(&Slot::new(db, table), path)
    }

    pub fn all_dependencies_satisfied(&self, deps: &[Dependency]) -> bool {
        self.inner.borrow().satisfied(deps)
    }

    /// Register `callback` to run whenever a write to one of the slots in
    /// `deps` leaves the whole set satisfied. An empty set never fires.
    /// Every referenced slot is created (empty) if it doesn't exist yet.
    pub fn register(&self, deps: &[Dependency], callback: Callback) {
        let mut inner = self.inner.borrow_mut();
        let index = inner.registrations.len();
        inner.registrations.push(Registration {
            deps: deps.to_vec(),
            callback,
        });
        for dep in deps {
            inner.data.entry(dep.slot.clone()).or_default();
            let indexes = inner.notify.entry(dep.slot.clone()).or_default();
            if !indexes.contains(&index) {
                indexes.push(index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn row(fields: &[(&str, &str)]) -> Row {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn counter(directory: &Directory, deps: &[Dependency]) -> Rc<Cell<usize>> {
        let fired = Rc::new(Cell::new(0));
        let count = Rc::clone(&fired);
        directory.register(deps, Rc::new(move || count.set(count.get() + 1)));
        fired
    }

    #[test]
    fn test_paths() {
        let directory = Directory::new();
        assert!(!directory.slot_exists(Database::Config, "DEVICE_METADATA"));
        assert!(!directory.path_exists(Database::Config, "DEVICE_METADATA", ""));
        assert!(!directory.path_exists(Database::Config, "DEVICE_METADATA", "localhost/bgp_asn"));

        directory.put(
            Database::Config,
            "DEVICE_METADATA",
            "localhost",
            row(&[("bgp_asn", "65100")]),
        );
        assert!(directory.slot_exists(Database::Config, "DEVICE_METADATA"));
        assert!(directory.path_exists(Database::Config, "DEVICE_METADATA", ""));
        assert!(directory.path_exists(Database::Config, "DEVICE_METADATA", "localhost"));
        assert!(directory.path_exists(Database::Config, "DEVICE_METADATA", "localhost/bgp_asn"));
        assert!(!directory.path_exists(Database::Config, "DEVICE_METADATA", "localhost/type"));
        assert!(!directory.path_exists(Database::Config, "DEVICE_METADATA", "remote/bgp_asn"));
        assert_eq!(
            directory
                .get_path(Database::Config, "DEVICE_METADATA", "localhost/bgp_asn")
                .as_ref()
                .and_then(Node::as_str),
            Some("65100")
        );
        assert!(directory
            .get(Database::Config, "DEVICE_METADATA", "remote")
            .is_none());
    }

    #[test]
    fn test_remove_missing_is_harmless() {
        let directory = Directory::new();
        directory.remove(Database::Local, "interfaces", "Ethernet0");
        directory.put(Database::Local, "interfaces", "Ethernet0", Row::new());
        directory.remove(Database::Local, "interfaces", "Ethernet4");
        directory.remove(Database::Local, "interfaces", "Ethernet0");
        // Slot outlives its last row
        assert!(directory.slot_exists(Database::Local, "interfaces"));
        assert!(directory.keys(Database::Local, "interfaces").is_empty());
        assert!(!directory.path_exists(Database::Local, "interfaces", ""));
        directory.remove_slot(Database::Local, "interfaces");
        assert!(!directory.slot_exists(Database::Local, "interfaces"));
        directory.remove_slot(Database::Local, "interfaces");
    }

    #[test]
    fn test_callback_fires_once_per_qualifying_write() {
        let directory = Directory::new();
        let deps = vec![
            Dependency::new(Database::Config, "DEVICE_METADATA", "localhost/bgp_asn"),
            Dependency::new(Database::Config, "DEVICE_METADATA", "localhost"),
            Dependency::new(Database::Local, "interfaces", ""),
        ];
        let fired = counter(&directory, &deps);

        directory.put(
            Database::Config,
            "DEVICE_METADATA",
            "localhost",
            row(&[("bgp_asn", "65100")]),
        );
        assert!(!directory.all_dependencies_satisfied(&deps));
        assert_eq!(fired.get(), 0);

        directory.put(Database::Local, "interfaces", "Ethernet0", Row::new());
        assert!(directory.all_dependencies_satisfied(&deps));
        assert_eq!(fired.get(), 1);

        // Two deps on the same slot, still a single fire per write
        directory.put(
            Database::Config,
            "DEVICE_METADATA",
            "localhost",
            row(&[("bgp_asn", "65200")]),
        );
        assert_eq!(fired.get(), 2);

        // Unrelated slots don't re-evaluate
        directory.put(Database::Config, "BGP_NEIGHBOR", "10.0.0.2", Row::new());
        assert_eq!(fired.get(), 2);

        // Removal never notifies
        directory.remove(Database::Local, "interfaces", "Ethernet0");
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn test_register_creates_slots() {
        let directory = Directory::new();
        let deps = vec![Dependency::new(Database::Config, "DEVICE_METADATA", "localhost/bgp_asn")];
        let fired = counter(&directory, &deps);
        assert!(directory.slot_exists(Database::Config, "DEVICE_METADATA"));
        assert!(directory.keys(Database::Config, "DEVICE_METADATA").is_empty());
        // An empty slot resolves nothing
        assert!(!directory.path_exists(Database::Config, "DEVICE_METADATA", ""));
        assert!(!directory.all_dependencies_satisfied(&deps));

        directory.put(
            Database::Config,
            "DEVICE_METADATA",
            "localhost",
            row(&[("bgp_asn", "65100")]),
        );
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_empty_dependency_set_never_fires() {
        let directory = Directory::new();
        let fired = counter(&directory, &[]);
        directory.put(Database::Config, "INTERFACE", "Ethernet0", Row::new());
        assert_eq!(fired.get(), 0);
        assert!(directory.all_dependencies_satisfied(&[]));
    }

    #[test]
    fn test_reentrant_callback() {
        let directory = Rc::new(Directory::new());
        let deps = vec![Dependency::new(Database::Config, "LOOPBACK_INTERFACE", "Loopback0")];
        let weak = Rc::downgrade(&directory);
        directory.register(
            &deps,
            Rc::new(move || {
                if let Some(directory) = weak.upgrade() {
                    directory.put(Database::Local, "derived", "Loopback0", Row::new());
                }
            }),
        );
        let derived = counter(
            &directory,
            &[Dependency::new(Database::Local, "derived", "Loopback0")],
        );

        directory.put(
            Database::Config,
            "LOOPBACK_INTERFACE",
            "Loopback0",
            Row::new(),
        );
        assert!(directory.path_exists(Database::Local, "derived", "Loopback0"));
        assert_eq!(derived.get(), 1);
    }
}
