use super::{PeerContext, RenderError, Template};

const PEER_GROUP: &str = "BGPMON";

pub(super) fn render(template: Template, ctx: &PeerContext) -> Result<String, RenderError> {
    match template {
        Template::Instance => {
            let name = ctx.require("name")?;
            let nbr = &ctx.neighbor;
            Ok([
                format!("  neighbor {} remote-as {}", nbr, ctx.bgp_asn),
                format!("  neighbor {} peer-group {}", nbr, PEER_GROUP),
                format!("  neighbor {} description {}", nbr, name),
                format!("  neighbor {} activate", nbr),
            ]
            .join("\n"))
        }
        Template::PeerGroup => Ok([
            format!("  neighbor {} peer-group", PEER_GROUP),
            format!("  neighbor {} update-source {}", PEER_GROUP, ctx.loopback_ip()?),
            format!("  neighbor {} route-map FROM_BGPMON in", PEER_GROUP),
            format!("  neighbor {} route-map TO_BGPMON out", PEER_GROUP),
            format!("  neighbor {} send-community", PEER_GROUP),
            format!("  neighbor {} maximum-prefix 1", PEER_GROUP),
        ]
        .join("\n")),
        Template::Policies => Ok([
            "route-map FROM_BGPMON deny 10",
            "!",
            "route-map TO_BGPMON permit 10",
            "!",
        ]
        .join("\n")),
    }
}
