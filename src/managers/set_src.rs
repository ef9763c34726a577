use std::net::IpAddr;
use std::rc::Rc;

use log::{error, info, warn};

use super::{Manager, Outcome};
use crate::directory::{Row, Slot};
use crate::frr::Frr;
use crate::templates;
use crate::utils::strip_prefix_len;

const LOOPBACK: &str = "Loopback0";

/// Points zebra at the Loopback0 addresses as the source of BGP routes,
/// once per address family
pub struct SetSrcManager {
    slot: Slot,
    frr: Rc<dyn Frr>,
    lo_ipv4: Option<IpAddr>,
    lo_ipv6: Option<IpAddr>,
}

impl SetSrcManager {
    pub fn new(slot: Slot, frr: Rc<dyn Frr>) -> Self {
        Self {
            slot,
            frr,
            lo_ipv4: None,
            lo_ipv6: None,
        }
    }

    fn set_source(&mut self, addr: IpAddr) {
        let (current, rm_name, ip_proto) = match addr {
            IpAddr::V4(_) => (&mut self.lo_ipv4, "RM_SET_SRC", ""),
            IpAddr::V6(_) => (&mut self.lo_ipv6, "RM_SET_SRC6", "v6"),
        };
        match *current {
            None => {
                let cmd = templates::set_src(rm_name, &addr.to_string(), ip_proto);
                if self.frr.push(&cmd) {
                    info!("{}: source address set to {}", self.slot, addr);
                    *current = Some(addr);
                } else {
                    error!("{}: Can't set source address {}", self.slot, addr);
                }
            }
            Some(existing) if existing == addr => {}
            Some(existing) => warn!(
                "{}: source address is already {}, ignoring {}. Update is not supported",
                self.slot, existing, addr
            ),
        }
    }
}

impl Manager for SetSrcManager {
    fn slot(&self) -> &Slot {
        &self.slot
    }

    fn apply_upsert(&mut self, key: &str, row: &Row) -> Outcome {
        let prefix = match key.strip_prefix(LOOPBACK).and_then(|rest| rest.strip_prefix('|')) {
            Some(prefix) => prefix,
            None => return Outcome::Handled,
        };
        if row.get("state").map(String::as_str) != Some("ok") {
            return Outcome::Handled;
        }
        if !prefix.contains('/') {
            error!("{}: Wrong {} address '{}'", self.slot, LOOPBACK, prefix);
            return Outcome::Handled;
        }
        match strip_prefix_len(prefix) {
            Ok(addr) => self.set_source(addr),
            Err(err) => error!("{}: Wrong {} address: {}", self.slot, LOOPBACK, err),
        }
        Outcome::Handled
    }

    fn apply_remove(&mut self, key: &str) {
        if key.starts_with(LOOPBACK) {
            warn!("{}: removal of '{}' is not supported", self.slot, key);
        }
    }
}
