use std::rc::Rc;

use log::{debug, error};

use crate::frr::Frr;
use crate::templates::{router_bgp, PeerContext, Renderer, Template};

/// Pushes the routing policies and the peer-group a session refers to
pub struct PeerGroups {
    frr: Rc<dyn Frr>,
    renderer: Rc<dyn Renderer>,
    template_dir: String,
}

impl PeerGroups {
    pub fn new(frr: Rc<dyn Frr>, renderer: Rc<dyn Renderer>, template_dir: &str) -> Self {
        Self {
            frr,
            renderer,
            template_dir: template_dir.to_string(),
        }
    }

    /// Render and push both artifacts for `ctx`.
    /// Returns true only if both were rendered and accepted.
    pub fn update(&self, tag: &str, ctx: &PeerContext) -> bool {
        let policies = self.push(tag, Template::Policies, ctx, None);
        let context_line = router_bgp(&ctx.bgp_asn, &ctx.vrf);
        let peer_group = self.push(tag, Template::PeerGroup, ctx, Some(&context_line));
        policies && peer_group
    }

    fn push(&self, tag: &str, template: Template, ctx: &PeerContext, prefix: Option<&str>) -> bool {
        let text = match self.renderer.render(&self.template_dir, template, ctx) {
            Ok(text) => text,
            Err(err) => {
                error!("Peer '{}': Can't render {} [{}]", tag, template, err);
                return false;
            }
        };
        if text.trim().is_empty() {
            debug!("Peer '{}': {} is empty, nothing to push", tag, template);
            return true;
        }
        let cmd = match prefix {
            Some(prefix) => format!("{}\n{}", prefix, text),
            None => text,
        };
        if self.frr.push(&cmd) {
            debug!("Peer '{}': {} updated", tag, template);
            true
        } else {
            error!("Peer '{}': Can't push {}", tag, template);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frr::testing::FakeFrr;
    use crate::templates::{tests::context, FrrTemplates, RenderError};

    /// Fails policies, renders the peer-group
    struct NoPolicies;

    impl Renderer for NoPolicies {
        fn render(
            &self,
            _template_dir: &str,
            template: Template,
            _ctx: &PeerContext,
        ) -> Result<String, RenderError> {
            match template {
                Template::Policies => Err(RenderError::MissingField("asn".to_string())),
                _ => Ok("  neighbor PEER_V4 peer-group".to_string()),
            }
        }
    }

    fn groups(frr: &Rc<FakeFrr>, renderer: Rc<dyn Renderer>) -> PeerGroups {
        PeerGroups::new(Rc::clone(frr) as Rc<dyn Frr>, renderer, "general")
    }

    #[test]
    fn test_policies_then_peer_group() {
        let frr = Rc::new(FakeFrr::new());
        let ctx = context("10.0.0.2", &[("asn", "65200")]);
        assert!(groups(&frr, Rc::new(FrrTemplates)).update("10.0.0.2", &ctx));

        let pushes = frr.pushed();
        assert_eq!(pushes.len(), 2);
        assert!(pushes[0].starts_with("route-map FROM_BGP_PEER_V4"));
        assert!(pushes[1].starts_with("router bgp 65100\n  neighbor PEER_V4 peer-group"));
    }

    #[test]
    fn test_both_attempted() {
        let frr = Rc::new(FakeFrr::new());
        let ctx = context("10.0.0.2", &[]);
        assert!(!groups(&frr, Rc::new(NoPolicies)).update("10.0.0.2", &ctx));
        assert_eq!(frr.pushed().len(), 1);

        let frr = Rc::new(FakeFrr::new());
        frr.accept.set(false);
        let ctx = context("10.0.0.2", &[("asn", "65200")]);
        assert!(!groups(&frr, Rc::new(FrrTemplates)).update("10.0.0.2", &ctx));
        assert_eq!(frr.pushed().len(), 2);
    }
}
