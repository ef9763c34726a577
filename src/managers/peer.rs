use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::rc::Rc;

use log::{debug, error, info, warn};

use super::interface::{INTERFACES, LOCAL_ADDRESSES};
use super::{Manager, Outcome, PeerGroups};
use crate::config::Constants;
use crate::directory::{Database, Dependency, Directory, Node, Row, Slot};
use crate::frr::{Frr, FrrError};
use crate::templates::{
    delete_neighbor, no_shutdown_neighbor, router_bgp, shutdown_neighbor, PeerContext, Renderer,
    Template,
};
use crate::utils::{network_from_str, split_vrf_key, strip_prefix_len};

const DEVICE_METADATA: &str = "DEVICE_METADATA";
const DEVICE_NEIGHBOR_METADATA: &str = "DEVICE_NEIGHBOR_METADATA";
const LOOPBACK_INTERFACE: &str = "LOOPBACK_INTERFACE";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerKind {
    /// Statically configured neighbors
    General,
    /// Listen ranges accepting neighbors on demand
    Dynamic,
    /// BGP monitoring sessions
    Monitors,
}

impl fmt::Display for PeerKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PeerKind::General => "general",
            PeerKind::Dynamic => "dynamic",
            PeerKind::Monitors => "monitors",
        };
        write!(f, "{}", name)
    }
}

/// Installs, updates and removes BGP sessions of one peer table
pub struct PeerManager {
    slot: Slot,
    kind: PeerKind,
    directory: Rc<Directory>,
    frr: Rc<dyn Frr>,
    renderer: Rc<dyn Renderer>,
    peer_groups: PeerGroups,
    template_dir: String,
    require_neighbor_metadata: bool,
    use_deployment_id: bool,
    // (vrf, neighbor) present in the running FRR config
    known_peers: BTreeSet<(String, String)>,
}

impl PeerManager {
    /// Fails if the peers already configured in FRR can't be read
    pub fn new(
        slot: Slot,
        kind: PeerKind,
        require_neighbor_metadata: bool,
        constants: &Constants,
        directory: Rc<Directory>,
        frr: Rc<dyn Frr>,
        renderer: Rc<dyn Renderer>,
    ) -> Result<Self, FrrError> {
        let known_peers: BTreeSet<(String, String)> = frr
            .live_peers()?
            .into_iter()
            .flat_map(|(vrf, neighbors)| {
                neighbors
                    .into_iter()
                    .map(move |neighbor| (vrf.clone(), neighbor))
            })
            .collect();
        info!(
            "{}: {} peer(s) already configured",
            slot,
            known_peers.len()
        );
        let template_dir = constants.template_dir(kind).to_string();
        Ok(Self {
            peer_groups: PeerGroups::new(Rc::clone(&frr), Rc::clone(&renderer), &template_dir),
            slot,
            kind,
            directory,
            frr,
            renderer,
            template_dir,
            require_neighbor_metadata,
            use_deployment_id: constants.use_deployment_id,
            known_peers,
        })
    }

    pub fn kind(&self) -> PeerKind {
        self.kind
    }

    pub fn is_known(&self, vrf: &str, neighbor: &str) -> bool {
        self.known_peers
            .contains(&(vrf.to_string(), neighbor.to_string()))
    }

    fn bgp_asn(&self) -> Option<String> {
        self.localhost_field("bgp_asn")
    }

    fn localhost_field(&self, name: &str) -> Option<String> {
        self.directory
            .get_path(Database::Config, DEVICE_METADATA, &format!("localhost/{}", name))
            .as_ref()
            .and_then(Node::as_str)
            .map(str::to_string)
    }

    /// First IPv4 prefix configured on Loopback0, E.g. "10.1.0.32/32"
    fn loopback0_ipv4(&self) -> Option<String> {
        self.directory
            .keys(Database::Config, LOOPBACK_INTERFACE)
            .into_iter()
            .filter_map(|key| key.strip_prefix("Loopback0|").map(str::to_string))
            .find(|prefix| {
                network_from_str(prefix)
                    .map(|network| network.is_ipv4())
                    .unwrap_or(false)
            })
    }

    /// Interface row owning a local address, if both are known
    fn local_interface(&self, addr: IpAddr) -> Option<(String, Node)> {
        let interface = self
            .directory
            .get_path(Database::Local, LOCAL_ADDRESSES, &format!("{}/interface", addr))?
            .as_str()?
            .to_string();
        let row = self.directory.get(Database::Local, INTERFACES, &interface)?;
        Some((interface, row))
    }

    fn push_under(&self, asn: &str, vrf: &str, cmd: &str) -> bool {
        self.frr.push(&format!("{}\n{}", router_bgp(asn, vrf), cmd))
    }

    fn add_peer(&mut self, vrf: &str, nbr: &str, row: &Row) -> Outcome {
        let bgp_asn = match self.bgp_asn() {
            Some(asn) => asn,
            None => {
                debug!("Peer '({}|{})': BGP ASN is not known yet", vrf, nbr);
                return Outcome::NotReady;
            }
        };
        let loopback0_ipv4 = match self.loopback0_ipv4() {
            Some(prefix) => prefix,
            None => {
                debug!("Peer '({}|{})': Loopback0 IPv4 address is not known yet", vrf, nbr);
                return Outcome::NotReady;
            }
        };

        if let Some(local_addr) = row.get("local_addr") {
            let addr = match strip_prefix_len(local_addr) {
                Ok(addr) => addr,
                Err(err) => {
                    error!("Peer '({}|{})': Invalid local_addr: {}", vrf, nbr, err);
                    return Outcome::Handled;
                }
            };
            match self.local_interface(addr) {
                None => {
                    debug!(
                        "Peer '({}|{})': interface for local address {} is not known yet",
                        vrf, nbr, addr
                    );
                    return Outcome::NotReady;
                }
                Some((interface, interface_row)) => {
                    if let Some(vnet) = interface_row
                        .field("vnet_name")
                        .filter(|vnet| !vnet.is_empty())
                    {
                        info!(
                            "Peer '({}|{})': skipped, {} belongs to VNET '{}'",
                            vrf, nbr, interface, vnet
                        );
                        return Outcome::Handled;
                    }
                }
            }
        }

        let neighbor_metadata = if self.require_neighbor_metadata {
            let metadata = self
                .directory
                .get_path(Database::Config, DEVICE_NEIGHBOR_METADATA, "")
                .unwrap_or_else(Node::empty);
            if let Some(name) = row.get("name") {
                if metadata.child(name).is_none() {
                    debug!(
                        "Peer '({}|{})': neighbor metadata for '{}' is not known yet",
                        vrf, nbr, name
                    );
                    return Outcome::NotReady;
                }
            }
            Some(metadata)
        } else {
            None
        };
        let deployment_id = if self.use_deployment_id {
            self.localhost_field("deployment_id")
        } else {
            None
        };

        let ctx = PeerContext {
            device_metadata: self
                .directory
                .get_path(Database::Config, DEVICE_METADATA, "")
                .unwrap_or_else(Node::empty),
            bgp_asn: bgp_asn.clone(),
            vrf: vrf.to_string(),
            neighbor: nbr.to_string(),
            session: row.clone(),
            loopback0_ipv4,
            neighbor_metadata,
            deployment_id,
        };
        let tag = format!("({}|{})", vrf, nbr);
        if !self.peer_groups.update(&tag, &ctx) {
            warn!("Peer '{}': peer-group or policies were not fully applied", tag);
        }

        let text = match self
            .renderer
            .render(&self.template_dir, Template::Instance, &ctx)
        {
            Ok(text) => text,
            Err(err) => {
                error!("Peer '{}': Can't render {} peer [{}]", tag, self.kind, err);
                return Outcome::Handled;
            }
        };
        if text.trim().is_empty() {
            info!("Peer '{}': nothing to configure", tag);
            return Outcome::Handled;
        }
        if self.push_under(&bgp_asn, vrf, &text) {
            info!("Peer '{}' added with attributes '{:?}'", tag, row);
            self.known_peers.insert((vrf.to_string(), nbr.to_string()));
        } else {
            error!("Peer '{}' wasn't added", tag);
        }
        Outcome::Handled
    }

    fn update_peer(&self, vrf: &str, nbr: &str, row: &Row) -> Outcome {
        let bgp_asn = match self.bgp_asn() {
            Some(asn) => asn,
            None => return Outcome::NotReady,
        };
        let (cmd, state) = match row.get("admin_status").map(String::as_str) {
            Some("up") => (no_shutdown_neighbor(nbr), "up"),
            Some("down") => (shutdown_neighbor(nbr), "down"),
            Some(other) => {
                error!(
                    "Peer '({}|{})': Can't update, admin_status '{}' is invalid",
                    vrf, nbr, other
                );
                return Outcome::Handled;
            }
            None => {
                error!(
                    "Peer '({}|{})': Can't update, only admin_status changes are supported: {:?}",
                    vrf, nbr, row
                );
                return Outcome::Handled;
            }
        };
        if self.push_under(&bgp_asn, vrf, &cmd) {
            info!("Peer '({}|{})' admin state is set to '{}'", vrf, nbr, state);
        } else {
            error!(
                "Peer '({}|{})': Can't set admin state to '{}'",
                vrf, nbr, state
            );
        }
        Outcome::Handled
    }
}

impl Manager for PeerManager {
    fn slot(&self) -> &Slot {
        &self.slot
    }

    fn dependencies(&self) -> Vec<Dependency> {
        let mut deps = vec![
            Dependency::new(Database::Config, DEVICE_METADATA, "localhost/bgp_asn"),
            Dependency::new(Database::Config, LOOPBACK_INTERFACE, "Loopback0"),
            Dependency::new(Database::Local, LOCAL_ADDRESSES, ""),
            Dependency::new(Database::Local, INTERFACES, ""),
        ];
        if self.require_neighbor_metadata {
            deps.push(Dependency::new(
                Database::Config,
                DEVICE_NEIGHBOR_METADATA,
                "",
            ));
        }
        if self.use_deployment_id {
            deps.push(Dependency::new(
                Database::Config,
                DEVICE_METADATA,
                "localhost/deployment_id",
            ));
        }
        deps
    }

    fn apply_upsert(&mut self, key: &str, row: &Row) -> Outcome {
        let (vrf, nbr) = split_vrf_key(key);
        if self.is_known(vrf, nbr) {
            self.update_peer(vrf, nbr, row)
        } else {
            self.add_peer(vrf, nbr, row)
        }
    }

    fn apply_remove(&mut self, key: &str) {
        let (vrf, nbr) = split_vrf_key(key);
        if !self.is_known(vrf, nbr) {
            warn!("Peer '({}|{})' has not been found", vrf, nbr);
            return;
        }
        let bgp_asn = match self.bgp_asn() {
            Some(asn) => asn,
            None => {
                error!("Peer '({}|{})': Can't remove, BGP ASN is unknown", vrf, nbr);
                return;
            }
        };
        if self.push_under(&bgp_asn, vrf, &delete_neighbor(nbr)) {
            info!("Peer '({}|{})' has been removed", vrf, nbr);
            self.known_peers
                .remove(&(vrf.to_string(), nbr.to_string()));
        } else {
            error!("Peer '({}|{})' hasn't been removed", vrf, nbr);
        }
    }
}
