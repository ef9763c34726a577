use itertools::Itertools;

use super::{PeerContext, RenderError, Template};
use crate::utils::network_from_str;

pub(super) fn render(template: Template, ctx: &PeerContext) -> Result<String, RenderError> {
    match template {
        Template::Instance => instance(ctx),
        Template::PeerGroup => peer_group(ctx),
        Template::Policies => policies(ctx),
    }
}

/// Listen ranges, deduplicated, in the order given
fn ip_ranges(ctx: &PeerContext) -> Result<Vec<String>, RenderError> {
    let ranges = ctx.require("ip_range")?;
    ranges
        .split(',')
        .map(str::trim)
        .filter(|range| !range.is_empty())
        .unique()
        .map(|range| {
            network_from_str(range)
                .map(|network| network.to_string())
                .map_err(|_| RenderError::InvalidValue("ip_range".to_string(), range.to_string()))
        })
        .collect()
}

fn instance(ctx: &PeerContext) -> Result<String, RenderError> {
    let name = ctx.require("name")?;
    let ranges = ip_ranges(ctx)?;
    let remote_as = ctx.field("peer_asn").unwrap_or("external");
    let source = match ctx.field("src_address") {
        Some(src) => crate::utils::strip_prefix_len(src)
            .map(|ip| ip.to_string())
            .map_err(|_| RenderError::InvalidValue("src_address".to_string(), src.to_string()))?,
        None => ctx.loopback_ip()?,
    };

    let mut lines = vec![
        format!("  neighbor {} peer-group", name),
        format!("  neighbor {} passive", name),
        format!("  neighbor {} remote-as {}", name, remote_as),
        format!("  neighbor {} ebgp-multihop 255", name),
        format!("  neighbor {} update-source {}", name, source),
    ];
    lines.extend(
        ranges
            .iter()
            .map(|range| format!("  bgp listen range {} peer-group {}", range, name)),
    );
    for family in &["ipv4", "ipv6"] {
        lines.push(format!("  address-family {}", family));
        lines.push(format!("    neighbor {} activate", name));
        lines.push(format!("    neighbor {} soft-reconfiguration inbound", name));
        lines.push(format!(
            "    neighbor {} route-map FROM_BGP_SPEAKER in",
            name
        ));
        lines.push(format!("    neighbor {} route-map TO_BGP_SPEAKER out", name));
        lines.push("  exit-address-family".to_string());
    }
    Ok(lines.join("\n"))
}

// Range peers carry their own peer-group in the instance
fn peer_group(ctx: &PeerContext) -> Result<String, RenderError> {
    ctx.require("name")?;
    Ok(String::new())
}

fn policies(ctx: &PeerContext) -> Result<String, RenderError> {
    ctx.require("name")?;
    Ok([
        "route-map FROM_BGP_SPEAKER permit 10",
        "!",
        "route-map TO_BGP_SPEAKER deny 1",
        "!",
    ]
    .join("\n"))
}
