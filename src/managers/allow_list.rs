use std::collections::BTreeMap;
use std::rc::Rc;

use ipnetwork::IpNetwork;
use itertools::Itertools;
use log::{error, info, warn};

use super::{Manager, Outcome};
use crate::directory::{Database, Dependency, Row, Slot};
use crate::frr::Frr;
use crate::utils::{network_from_str, ParseError};

const KEY_PREFIX: &str = "DEPLOYMENT_ID";
// Route-map entry sequence, entries with a community match first
const SEQ_COMMUNITY: u32 = 30000;
const SEQ_NO_COMMUNITY: u32 = 65000;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Family {
    V4,
    V6,
}

impl Family {
    fn suffix(self) -> &'static str {
        match self {
            Family::V4 => "V4",
            Family::V6 => "V6",
        }
    }

    fn ip(self) -> &'static str {
        match self {
            Family::V4 => "ip",
            Family::V6 => "ipv6",
        }
    }

    fn max_len(self) -> u8 {
        match self {
            Family::V4 => 32,
            Family::V6 => 128,
        }
    }

    fn field(self) -> &'static str {
        match self {
            Family::V4 => "prefixes_v4",
            Family::V6 => "prefixes_v6",
        }
    }
}

/// Prefixes accepted from peers of one deployment, optionally tagged with a community
#[derive(Debug, PartialEq)]
struct AllowList {
    deployment_id: u32,
    community: Option<String>,
    prefixes: Vec<(Family, Vec<IpNetwork>)>,
}

impl AllowList {
    /// Parse `DEPLOYMENT_ID|<id>[|<community>]` and its prefix fields
    fn parse(key: &str, row: &Row) -> Result<Self, ParseError> {
        let parts: Vec<&str> = key.split('|').collect();
        let (id, community) = match parts.as_slice() {
            [KEY_PREFIX, id] => (*id, None),
            [KEY_PREFIX, id, community] => (*id, Some(*community)),
            _ => return Err(ParseError::new(format!("Invalid key '{}'", key))),
        };
        let deployment_id = id
            .parse::<u32>()
            .map_err(|_| ParseError::new(format!("Invalid deployment id '{}'", id)))?;
        let community = match community {
            Some(c) if c.is_empty() || c.contains(char::is_whitespace) => {
                return Err(ParseError::new(format!("Invalid community '{}'", c)))
            }
            Some(c) => Some(c.to_string()),
            None => None,
        };

        let mut prefixes = vec![];
        for family in &[Family::V4, Family::V6] {
            let networks = Self::parse_prefixes(*family, row.get(family.field()))?;
            if !networks.is_empty() {
                prefixes.push((*family, networks));
            }
        }
        Ok(Self {
            deployment_id,
            community,
            prefixes,
        })
    }

    fn parse_prefixes(family: Family, value: Option<&String>) -> Result<Vec<IpNetwork>, ParseError> {
        let value = match value {
            Some(value) => value,
            None => return Ok(vec![]),
        };
        value
            .split(',')
            .map(str::trim)
            .filter(|prefix| !prefix.is_empty())
            .unique()
            .map(|prefix| {
                let network = network_from_str(prefix)?;
                if network.is_ipv4() != (family == Family::V4) {
                    return Err(ParseError::new(format!(
                        "'{}' doesn't belong in {}",
                        prefix,
                        family.field()
                    )));
                }
                Ok(network)
            })
            .collect()
    }

    fn community_tag(&self) -> &str {
        self.community.as_deref().unwrap_or("empty")
    }

    fn prefix_list(&self, family: Family) -> String {
        format!(
            "PL_ALLOW_LIST_{}_{}_COMMUNITY_{}_{}",
            KEY_PREFIX,
            self.deployment_id,
            self.community_tag(),
            family.suffix()
        )
    }

    fn community_list(&self) -> String {
        format!(
            "COMMUNITY_ALLOW_LIST_{}_{}_COMMUNITY_{}",
            KEY_PREFIX,
            self.deployment_id,
            self.community_tag()
        )
    }

    fn route_map(&self, family: Family) -> String {
        format!(
            "ALLOW_LIST_{}_{}_{}",
            KEY_PREFIX,
            self.deployment_id,
            family.suffix()
        )
    }

    fn seq(&self) -> u32 {
        if self.community.is_some() {
            SEQ_COMMUNITY
        } else {
            SEQ_NO_COMMUNITY
        }
    }

    fn config(&self) -> String {
        let mut lines = vec![];
        for (family, networks) in &self.prefixes {
            let name = self.prefix_list(*family);
            for (i, network) in networks.iter().enumerate() {
                let le = if network.prefix() < family.max_len() {
                    format!(" le {}", family.max_len())
                } else {
                    String::new()
                };
                lines.push(format!(
                    "{} prefix-list {} seq {} permit {}{}",
                    family.ip(),
                    name,
                    (i + 1) * 10,
                    network,
                    le
                ));
            }
        }
        if let Some(community) = &self.community {
            lines.push(format!(
                "bgp community-list standard {} permit {}",
                self.community_list(),
                community
            ));
        }
        for (family, _) in &self.prefixes {
            lines.push(format!(
                "route-map {} permit {}",
                self.route_map(*family),
                self.seq()
            ));
            lines.push(format!(
                " match {} address prefix-list {}",
                family.ip(),
                self.prefix_list(*family)
            ));
            if self.community.is_some() {
                lines.push(format!(" match community {}", self.community_list()));
            }
            lines.push("!".to_string());
        }
        lines.join("\n")
    }

    fn removal(&self) -> String {
        let mut lines = vec![];
        for (family, _) in &self.prefixes {
            lines.push(format!(
                "no route-map {} permit {}",
                self.route_map(*family),
                self.seq()
            ));
            lines.push(format!(
                "no {} prefix-list {}",
                family.ip(),
                self.prefix_list(*family)
            ));
        }
        if self.community.is_some() {
            lines.push(format!(
                "no bgp community-list standard {}",
                self.community_list()
            ));
        }
        lines.join("\n")
    }
}

/// Turns BGP_ALLOWED_PREFIXES rows into prefix-lists and allow-list route-maps
pub struct AllowListManager {
    slot: Slot,
    frr: Rc<dyn Frr>,
    known: BTreeMap<String, AllowList>,
}

impl AllowListManager {
    pub fn new(slot: Slot, frr: Rc<dyn Frr>) -> Self {
        Self {
            slot,
            frr,
            known: BTreeMap::new(),
        }
    }
}

impl Manager for AllowListManager {
    fn slot(&self) -> &Slot {
        &self.slot
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::new(
            Database::Config,
            "DEVICE_METADATA",
            "localhost/bgp_asn",
        )]
    }

    fn apply_upsert(&mut self, key: &str, row: &Row) -> Outcome {
        let allow_list = match AllowList::parse(key, row) {
            Ok(allow_list) => allow_list,
            Err(err) => {
                error!("{}: Can't apply '{}': {}", self.slot, key, err);
                return Outcome::Handled;
            }
        };
        if allow_list.prefixes.is_empty() {
            warn!("{}: '{}' has no prefixes", self.slot, key);
            return Outcome::Handled;
        }
        // A replaced entry is withdrawn first, families dropped by the update included
        let cmd = match self.known.get(key) {
            Some(previous) => format!("{}\n{}", previous.removal(), allow_list.config()),
            None => allow_list.config(),
        };
        if self.frr.push(&cmd) {
            info!("{}: allow-list '{}' updated", self.slot, key);
            self.known.insert(key.to_string(), allow_list);
        } else {
            error!("{}: Can't update allow-list '{}'", self.slot, key);
        }
        Outcome::Handled
    }

    fn apply_remove(&mut self, key: &str) {
        let allow_list = match self.known.get(key) {
            Some(allow_list) => allow_list,
            None => {
                warn!("{}: allow-list '{}' is not known", self.slot, key);
                return;
            }
        };
        if self.frr.push(&allow_list.removal()) {
            info!("{}: allow-list '{}' removed", self.slot, key);
            self.known.remove(key);
        } else {
            error!("{}: Can't remove allow-list '{}'", self.slot, key);
        }
    }
}
