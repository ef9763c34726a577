use std::rc::Rc;

use log::debug;

use super::{Manager, Outcome};
use crate::directory::{Directory, Row, Slot};

/// Mirrors a table into the directory so other managers can depend on it
pub struct StoreManager {
    slot: Slot,
    directory: Rc<Directory>,
}

impl StoreManager {
    pub fn new(slot: Slot, directory: Rc<Directory>) -> Self {
        Self { slot, directory }
    }
}

impl Manager for StoreManager {
    fn slot(&self) -> &Slot {
        &self.slot
    }

    fn apply_upsert(&mut self, key: &str, row: &Row) -> Outcome {
        debug!("{}: stored '{}'", self.slot, key);
        self.directory
            .put(self.slot.db, &self.slot.table, key, row.clone());
        Outcome::Handled
    }

    fn apply_remove(&mut self, key: &str) {
        debug!("{}: removed '{}'", self.slot, key);
        self.directory.remove(self.slot.db, &self.slot.table, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Database;

    #[test]
    fn test_mirror() {
        let directory = Rc::new(Directory::new());
        let mut store = StoreManager::new(
            Slot::new(Database::Config, "DEVICE_METADATA"),
            Rc::clone(&directory),
        );
        let mut row = Row::new();
        row.insert("bgp_asn".to_string(), "65100".to_string());
        assert_eq!(store.apply_upsert("localhost", &row), Outcome::Handled);
        assert!(directory.path_exists(Database::Config, "DEVICE_METADATA", "localhost/bgp_asn"));

        store.apply_remove("localhost");
        store.apply_remove("localhost");
        assert!(!directory.path_exists(Database::Config, "DEVICE_METADATA", "localhost"));
    }
}
