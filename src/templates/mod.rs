//! FRR configuration text
//!
//! Peer sessions are rendered from a template family (`general`, `dynamic`,
//! `monitors`) chosen per peer kind in the constants file. Each family
//! provides an `instance` (the session itself), a `peer-group` and the
//! routing `policies` the peer-group refers to.
mod dynamic;
mod general;
mod monitors;

use std::error;
use std::fmt;

use crate::directory::{Node, Row};
use crate::utils::{flag_is_set, strip_prefix_len};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Template {
    Instance,
    PeerGroup,
    Policies,
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Template::Instance => "instance",
            Template::PeerGroup => "peer-group",
            Template::Policies => "policies",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, PartialEq)]
pub enum RenderError {
    /// No such template. [template_dir, template]
    UnknownTemplate(String, Template),
    /// Required session field is absent. [field]
    MissingField(String),
    /// Field value can't be used. [field, value]
    InvalidValue(String, String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Render Error: ")?;
        use RenderError::*;
        match self {
            UnknownTemplate(dir, t) => write!(f, "No template '{}/{}'", dir, t),
            MissingField(field) => write!(f, "Missing attribute '{}'", field),
            InvalidValue(field, value) => write!(f, "Bad value for '{}': '{}'", field, value),
        }
    }
}

impl error::Error for RenderError {
    fn description(&self) -> &str {
        "Render Error"
    }
}

/// Everything a peer template may refer to
#[derive(Clone, Debug)]
pub struct PeerContext {
    /// Whole DEVICE_METADATA table
    pub device_metadata: Node,
    pub bgp_asn: String,
    pub vrf: String,
    pub neighbor: String,
    /// The peer table row
    pub session: Row,
    /// Loopback0 IPv4 prefix, E.g. "10.1.0.32/32"
    pub loopback0_ipv4: String,
    pub neighbor_metadata: Option<Node>,
    pub deployment_id: Option<String>,
}

impl PeerContext {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.session.get(name).map(String::as_str)
    }

    fn require(&self, name: &str) -> Result<&str, RenderError> {
        self.field(name)
            .ok_or_else(|| RenderError::MissingField(name.to_string()))
    }

    fn flag(&self, name: &str) -> Result<bool, RenderError> {
        flag_is_set(self.session.get(name))
            .map_err(|_| RenderError::InvalidValue(name.to_string(), self.session[name].clone()))
    }

    fn localhost(&self, name: &str) -> Option<&str> {
        self.device_metadata
            .child("localhost")
            .and_then(|localhost| localhost.field(name))
    }

    fn loopback_ip(&self) -> Result<String, RenderError> {
        strip_prefix_len(&self.loopback0_ipv4)
            .map(|ip| ip.to_string())
            .map_err(|_| {
                RenderError::InvalidValue("loopback0_ipv4".to_string(), self.loopback0_ipv4.clone())
            })
    }
}

pub trait Renderer {
    fn render(
        &self,
        template_dir: &str,
        template: Template,
        ctx: &PeerContext,
    ) -> Result<String, RenderError>;
}

/// Built-in FRR template families
#[derive(Debug, Default)]
pub struct FrrTemplates;

impl Renderer for FrrTemplates {
    fn render(
        &self,
        template_dir: &str,
        template: Template,
        ctx: &PeerContext,
    ) -> Result<String, RenderError> {
        match template_dir {
            "general" => general::render(template, ctx),
            "dynamic" => dynamic::render(template, ctx),
            "monitors" => monitors::render(template, ctx),
            other => Err(RenderError::UnknownTemplate(other.to_string(), template)),
        }
    }
}

/// BGP instance context line
pub fn router_bgp(asn: &str, vrf: &str) -> String {
    if vrf == crate::utils::DEFAULT_VRF {
        format!("router bgp {}", asn)
    } else {
        format!("router bgp {} vrf {}", asn, vrf)
    }
}

pub fn delete_neighbor(neighbor: &str) -> String {
    format!("no neighbor {}", neighbor)
}

pub fn shutdown_neighbor(neighbor: &str) -> String {
    format!("neighbor {} shutdown", neighbor)
}

pub fn no_shutdown_neighbor(neighbor: &str) -> String {
    format!("no neighbor {} shutdown", neighbor)
}

/// Zebra source address for routes learned through BGP
/// (`ip_proto` is "" for IPv4, "v6" for IPv6)
pub fn set_src(rm_name: &str, lo_ip: &str, ip_proto: &str) -> String {
    [
        format!("route-map {} permit 10", rm_name),
        format!(" set src {}", lo_ip),
        "!".to_string(),
        format!("ip{} protocol bgp route-map {}", ip_proto, rm_name),
        "!".to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;

    pub(crate) fn context(neighbor: &str, session: &[(&str, &str)]) -> PeerContext {
        let mut localhost = Row::new();
        localhost.insert("bgp_asn".to_string(), "65100".to_string());
        localhost.insert("type".to_string(), "LeafRouter".to_string());
        let mut metadata = BTreeMap::new();
        metadata.insert("localhost".to_string(), Node::from(localhost));
        PeerContext {
            device_metadata: Node::Branch(metadata),
            bgp_asn: "65100".to_string(),
            vrf: "default".to_string(),
            neighbor: neighbor.to_string(),
            session: session
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            loopback0_ipv4: "10.1.0.32/32".to_string(),
            neighbor_metadata: None,
            deployment_id: None,
        }
    }

    #[test]
    fn test_router_bgp() {
        assert_eq!(router_bgp("65100", "default"), "router bgp 65100");
        assert_eq!(router_bgp("65100", "Vrf-red"), "router bgp 65100 vrf Vrf-red");
    }

    #[test]
    fn test_set_src() {
        assert_eq!(
            set_src("RM_SET_SRC6", "fc00:1::32", "v6"),
            "route-map RM_SET_SRC6 permit 10\n set src fc00:1::32\n!\nipv6 protocol bgp route-map RM_SET_SRC6\n!"
        );
    }

    #[test]
    fn test_unknown_family() {
        let ctx = context("10.0.0.2", &[("asn", "65200")]);
        assert_eq!(
            FrrTemplates.render("legacy", Template::Instance, &ctx),
            Err(RenderError::UnknownTemplate(
                "legacy".to_string(),
                Template::Instance
            ))
        );
    }
}
