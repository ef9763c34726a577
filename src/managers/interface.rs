use std::rc::Rc;

use log::{debug, warn};

use super::{Manager, Outcome};
use crate::directory::{Database, Directory, Node, Row, Slot};
use crate::utils::{network_from_str, split_interface_key};

/// Bare address -> row of the address entry, plus `interface` and `prefixlen`
pub const LOCAL_ADDRESSES: &str = "local_addresses";
/// Interface name -> interface row
pub const INTERFACES: &str = "interfaces";

/// Mirrors an interface table and maintains the derived local address and
/// interface indexes
pub struct InterfaceManager {
    slot: Slot,
    directory: Rc<Directory>,
}

impl InterfaceManager {
    pub fn new(slot: Slot, directory: Rc<Directory>) -> Self {
        Self { slot, directory }
    }

    fn mirror(&self, key: &str, row: &Row) {
        self.directory
            .put(self.slot.db, &self.slot.table, key, row.clone());
    }

    fn own_keys(&self, interface: &str) -> Vec<String> {
        let prefix = format!("{}|", interface);
        self.directory
            .keys(self.slot.db, &self.slot.table)
            .into_iter()
            .filter(|key| key == interface || key.starts_with(&prefix))
            .collect()
    }

    fn add_address(&self, key: &str, interface: &str, prefix: &str, row: &Row) -> Outcome {
        let network = match network_from_str(prefix) {
            Ok(network) => network,
            Err(err) => {
                warn!("{}: Can't parse address of '{}': {}", self.slot, key, err);
                return Outcome::Handled;
            }
        };
        let mut local = row.clone();
        local.insert("interface".to_string(), interface.to_string());
        local.insert("prefixlen".to_string(), network.prefix().to_string());

        self.mirror(key, row);
        self.directory.put(
            Database::Local,
            LOCAL_ADDRESSES,
            &network.ip().to_string(),
            local,
        );
        // Publish the interface even before its own row arrives, so peers on this
        // address can resolve. Until that row shows up the interface carries no
        // vnet_name, and a peer installed meanwhile is not skipped as a VNET peer.
        if self
            .directory
            .get(Database::Local, INTERFACES, interface)
            .is_none()
        {
            let interface_row = self
                .directory
                .get(self.slot.db, &self.slot.table, interface)
                .unwrap_or_else(Node::empty);
            self.directory
                .put(Database::Local, INTERFACES, interface, interface_row);
        }
        debug!("{}: {} is local to {}", self.slot, network.ip(), interface);
        Outcome::Handled
    }

    fn remove_address(&self, key: &str, interface: &str, prefix: &str) {
        match network_from_str(prefix) {
            Ok(network) => {
                self.directory
                    .remove(Database::Local, LOCAL_ADDRESSES, &network.ip().to_string());
            }
            Err(err) => {
                warn!("{}: Can't parse address of '{}': {}", self.slot, key, err);
                return;
            }
        }
        self.directory.remove(self.slot.db, &self.slot.table, key);
        if self.own_keys(interface).is_empty() {
            self.directory.remove(Database::Local, INTERFACES, interface);
        }
    }

    fn remove_interface(&self, interface: &str) {
        self.directory
            .remove(self.slot.db, &self.slot.table, interface);
        if self.own_keys(interface).is_empty() {
            self.directory.remove(Database::Local, INTERFACES, interface);
        } else {
            // Addresses still refer to it
            self.directory
                .put(Database::Local, INTERFACES, interface, Node::empty());
        }
    }
}

impl Manager for InterfaceManager {
    fn slot(&self) -> &Slot {
        &self.slot
    }

    fn apply_upsert(&mut self, key: &str, row: &Row) -> Outcome {
        match split_interface_key(key) {
            Some((interface, prefix)) => self.add_address(key, interface, prefix, row),
            None => {
                self.mirror(key, row);
                self.directory
                    .put(Database::Local, INTERFACES, key, row.clone());
                Outcome::Handled
            }
        }
    }

    fn apply_remove(&mut self, key: &str) {
        match split_interface_key(key) {
            Some((interface, prefix)) => self.remove_address(key, interface, prefix),
            None => self.remove_interface(key),
        }
    }
}
