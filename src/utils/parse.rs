use std::error::Error;
use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;

/// VRF used when a table key carries no VRF prefix
pub const DEFAULT_VRF: &str = "default";

#[derive(Debug, PartialEq)]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    pub fn new(reason: String) -> Self {
        ParseError { reason }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParseError: {}", self.reason)
    }
}

impl Error for ParseError {
    fn description(&self) -> &str {
        "Error parsing values from config tables"
    }
}

/// Split a peer table key into (vrf, neighbor)
/// E.g. "Vrf-red|10.0.0.2" -> ("Vrf-red", "10.0.0.2"), "10.0.0.2" -> ("default", "10.0.0.2")
pub fn split_vrf_key(key: &str) -> (&str, &str) {
    match key.find('|') {
        Some(i) => (&key[..i], &key[i + 1..]),
        None => (DEFAULT_VRF, key),
    }
}

/// Split an interface table key into (interface, address)
/// E.g. "Ethernet0|10.0.0.1/31" -> Some(("Ethernet0", "10.0.0.1/31"))
pub fn split_interface_key(key: &str) -> Option<(&str, &str)> {
    key.find('|').map(|i| (&key[..i], &key[i + 1..]))
}

/// Parse an address with an optional prefix length into a network
/// (a bare address is treated as a host route)
pub fn network_from_str(value: &str) -> Result<IpNetwork, ParseError> {
    value
        .trim()
        .parse::<IpNetwork>()
        .map_err(|err| ParseError::new(format!("{} '{}'", err, value)))
}

/// Drop the prefix length from an address
/// E.g. "10.0.0.1/31" -> 10.0.0.1
pub fn strip_prefix_len(value: &str) -> Result<IpAddr, ParseError> {
    network_from_str(value).map(|network| network.ip())
}

/// Interpret an integer flag field ("0" is false, any other integer is true)
pub fn flag_is_set(value: Option<&String>) -> Result<bool, ParseError> {
    match value {
        None => Ok(false),
        Some(v) => v
            .trim()
            .parse::<i64>()
            .map(|v| v != 0)
            .map_err(|err| ParseError::new(format!("{} '{}'", err, v))),
    }
}
