use std::net::IpAddr;

use super::{PeerContext, RenderError, Template};

const DEFAULT_KEEPALIVE: u32 = 60;
const DEFAULT_HOLDTIME: u32 = 180;

pub(super) fn render(template: Template, ctx: &PeerContext) -> Result<String, RenderError> {
    match template {
        Template::Instance => instance(ctx),
        Template::PeerGroup => peer_group(ctx),
        Template::Policies => policies(ctx),
    }
}

/// Peer-group name for the neighbor's address family
fn group_name(ctx: &PeerContext) -> Result<String, RenderError> {
    let family = match neighbor_addr(ctx)? {
        IpAddr::V4(_) => "V4",
        IpAddr::V6(_) => "V6",
    };
    if is_internal(ctx) {
        Ok(format!("PEER_{}_INT", family))
    } else {
        Ok(format!("PEER_{}", family))
    }
}

fn neighbor_addr(ctx: &PeerContext) -> Result<IpAddr, RenderError> {
    ctx.neighbor
        .parse::<IpAddr>()
        .map_err(|_| RenderError::InvalidValue("neighbor".to_string(), ctx.neighbor.clone()))
}

// Sessions between ASICs of the same chassis
fn is_internal(ctx: &PeerContext) -> bool {
    ctx.field("name").map_or(false, |name| name.contains("ASIC"))
}

fn timer(ctx: &PeerContext, name: &str, default: u32) -> Result<u32, RenderError> {
    match ctx.field(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<u32>()
            .map_err(|_| RenderError::InvalidValue(name.to_string(), value.to_string())),
    }
}

fn instance(ctx: &PeerContext) -> Result<String, RenderError> {
    let asn = ctx.require("asn")?;
    let asn_value = asn
        .trim()
        .parse::<u32>()
        .map_err(|_| RenderError::InvalidValue("asn".to_string(), asn.to_string()))?;
    if asn_value == 0 {
        return Ok(String::new());
    }
    let nbr = &ctx.neighbor;
    let addr = neighbor_addr(ctx)?;
    let group = group_name(ctx)?;

    let mut lines = vec![
        format!("  bgp router-id {}", ctx.loopback_ip()?),
        format!("  neighbor {} remote-as {}", nbr, asn_value),
    ];
    if let Some(name) = ctx.field("name") {
        lines.push(format!("  neighbor {} description {}", nbr, name));
    }
    let keepalive = timer(ctx, "keepalive", DEFAULT_KEEPALIVE)?;
    let holdtime = timer(ctx, "holdtime", DEFAULT_HOLDTIME)?;
    if keepalive != DEFAULT_KEEPALIVE || holdtime != DEFAULT_HOLDTIME {
        lines.push(format!("  neighbor {} timers {} {}", nbr, keepalive, holdtime));
    }
    let admin_down = match ctx.field("admin_status") {
        Some(status) => status == "down",
        None => ctx.localhost("default_bgp_status") == Some("down"),
    };
    if admin_down {
        lines.push(format!("  neighbor {} shutdown", nbr));
    }
    if let Some(local_addr) = ctx.field("local_addr") {
        let source = crate::utils::strip_prefix_len(local_addr).map_err(|_| {
            RenderError::InvalidValue("local_addr".to_string(), local_addr.to_string())
        })?;
        lines.push(format!("  neighbor {} update-source {}", nbr, source));
    }

    let family = if addr.is_ipv4() { "ipv4" } else { "ipv6" };
    lines.push(format!("  address-family {}", family));
    lines.push(format!("    neighbor {} peer-group {}", nbr, group));
    if ctx.flag("rrclient")? {
        lines.push(format!("    neighbor {} route-reflector-client", nbr));
    }
    if ctx.flag("nhopself")? {
        lines.push(format!("    neighbor {} next-hop-self", nbr));
    }
    lines.push(format!("    neighbor {} activate", nbr));
    lines.push("  exit-address-family".to_string());
    Ok(lines.join("\n"))
}

fn peer_group(ctx: &PeerContext) -> Result<String, RenderError> {
    let group = group_name(ctx)?;
    let family = if neighbor_addr(ctx)?.is_ipv4() {
        "ipv4"
    } else {
        "ipv6"
    };
    let mut lines = vec![
        format!("  neighbor {} peer-group", group),
        format!("  address-family {}", family),
    ];
    // Leaf devices take back routes carrying their own ASN
    if ctx.localhost("type") == Some("ToRRouter") {
        lines.push(format!("    neighbor {} allowas-in 1", group));
    }
    lines.push(format!("    neighbor {} soft-reconfiguration inbound", group));
    lines.push(format!("    neighbor {} route-map FROM_BGP_{} in", group, group));
    lines.push(format!("    neighbor {} route-map TO_BGP_{} out", group, group));
    lines.push("  exit-address-family".to_string());
    Ok(lines.join("\n"))
}

fn policies(ctx: &PeerContext) -> Result<String, RenderError> {
    let group = group_name(ctx)?;
    let family = if neighbor_addr(ctx)?.is_ipv4() {
        "V4"
    } else {
        "V6"
    };
    let mut lines = vec![];
    if let Some(id) = &ctx.deployment_id {
        lines.push(format!("route-map FROM_BGP_{} permit 2", group));
        lines.push(format!(" call ALLOW_LIST_DEPLOYMENT_ID_{}_{}", id, family));
        lines.push(" on-match next".to_string());
        lines.push("!".to_string());
    }
    lines.push(format!("route-map FROM_BGP_{} permit 100", group));
    lines.push("!".to_string());
    lines.push(format!("route-map TO_BGP_{} permit 100", group));
    lines.push("!".to_string());
    Ok(lines.join("\n"))
}
