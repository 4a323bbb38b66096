//! Player detection.
//!
//! Applies a fixed priority order of detection strategies against the
//! live DOM and returns at most one candidate control together with its
//! engine family. Strategy order is stable, so identical DOM state always
//! yields the same candidate; a visible lower-priority control is never
//! displaced by a hidden higher-priority decoy.

use std::sync::Arc;

use tracing::debug;

use crate::config::EngineConfig;
use crate::dom::{DomSurface, NodeId};
use crate::error::DomError;

/// Which slide-player implementation the probe believes is present.
///
/// A closed set: new player engines are supported by adding a variant
/// plus its probe/gate pair, never by widening existing branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFamily {
    /// Gating is expressed through disabled classes / `aria-disabled`.
    AttributeGated,
    /// Gating is expressed through an elapsed/total time label.
    TimerGated,
}

impl std::fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AttributeGated => write!(f, "attribute-gated"),
            Self::TimerGated => write!(f, "timer-gated"),
        }
    }
}

/// One poll cycle's view of the detected player.
///
/// Created fresh each cycle and dropped at its end; the underlying
/// elements may be replaced by the player between slides, so handles are
/// never carried across cycles.
#[derive(Debug, Clone, Copy)]
pub struct PlayerContext {
    /// The detected engine family.
    pub family: EngineFamily,
    /// The element representing the "next" affordance.
    pub control: NodeId,
    /// Companion elapsed/total display, when the family has one.
    pub time_label: Option<NodeId>,
}

/// Scans the DOM for a candidate control using ordered per-engine
/// strategies.
#[derive(Debug, Clone)]
pub struct PlayerProbe {
    config: Arc<EngineConfig>,
}

impl PlayerProbe {
    /// Creates a probe over the given selector configuration.
    #[must_use]
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Applies the detection strategies in priority order and returns the
    /// first match, or `None` when nothing visible matches.
    ///
    /// # Errors
    ///
    /// Propagates DOM surface failures; the controller swallows these at
    /// the cycle boundary.
    pub async fn scan(&self, dom: &dyn DomSurface) -> Result<Option<PlayerContext>, DomError> {
        if let Some(ctx) = self.scan_timer_family(dom).await? {
            return Ok(Some(ctx));
        }
        if let Some(ctx) = self.scan_attribute_family(dom).await? {
            return Ok(Some(ctx));
        }
        self.scan_free_text(dom).await
    }

    /// Strategy 1: the timer-family container class combination.
    async fn scan_timer_family(
        &self,
        dom: &dyn DomSurface,
    ) -> Result<Option<PlayerContext>, DomError> {
        let selector = &self.config.selectors.timer_control;
        if selector.is_empty() {
            return Ok(None);
        }

        for node in dom.query_all(selector).await? {
            if !dom.is_visible(node).await? {
                continue;
            }
            let time_label = first_visible(dom, &self.config.selectors.timer_label).await?;
            debug!(%node, ?time_label, "timer-family control detected");
            return Ok(Some(PlayerContext {
                family: EngineFamily::TimerGated,
                control: node,
                time_label,
            }));
        }
        Ok(None)
    }

    /// Strategy 2: the ordered attribute-family selector list, filtered
    /// to elements that actually have a rendered box.
    async fn scan_attribute_family(
        &self,
        dom: &dyn DomSurface,
    ) -> Result<Option<PlayerContext>, DomError> {
        for selector in &self.config.selectors.attribute_controls {
            for node in dom.query_all(selector).await? {
                if dom.is_visible(node).await? {
                    debug!(%node, selector, "attribute-family control detected");
                    return Ok(Some(PlayerContext {
                        family: EngineFamily::AttributeGated,
                        control: node,
                        time_label: None,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Strategy 3: free-text fallback over interactive-looking elements,
    /// climbing to the nearest recognizable container class.
    async fn scan_free_text(
        &self,
        dom: &dyn DomSurface,
    ) -> Result<Option<PlayerContext>, DomError> {
        if self.config.next_labels.is_empty() {
            return Ok(None);
        }

        for node in dom.interactive_nodes().await? {
            if !dom.is_visible(node).await? {
                continue;
            }
            let text = dom.text(node).await?;
            if !self.matches_label(&text) {
                continue;
            }

            // Prefer the enclosing control container; the text element
            // itself is the fallback.
            let mut control = node;
            for container in &self.config.selectors.containers {
                if let Some(ancestor) = dom.closest(node, container).await? {
                    control = ancestor;
                    break;
                }
            }

            debug!(%node, %control, text = text.trim(), "free-text control detected");
            return Ok(Some(PlayerContext {
                family: EngineFamily::AttributeGated,
                control,
                time_label: None,
            }));
        }
        Ok(None)
    }

    /// Exact, case-normalized comparison against the label set.
    fn matches_label(&self, text: &str) -> bool {
        let normalized = text.trim().to_uppercase();
        if normalized.is_empty() {
            return false;
        }
        self.config
            .next_labels
            .iter()
            .any(|label| label.trim().to_uppercase() == normalized)
    }
}

/// First visible element matching a selector, if any.
async fn first_visible(dom: &dyn DomSurface, selector: &str) -> Result<Option<NodeId>, DomError> {
    if selector.is_empty() {
        return Ok(None);
    }
    for node in dom.query_all(selector).await? {
        if dom.is_visible(node).await? {
            return Ok(Some(node));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::fixture::{FixtureDom, FixtureNode};

    fn probe() -> PlayerProbe {
        PlayerProbe::new(Arc::new(EngineConfig::default()))
    }

    #[tokio::test]
    async fn empty_dom_yields_no_candidate() {
        let dom = FixtureDom::builder().build();
        assert!(probe().scan(&dom).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn timer_family_takes_priority() {
        let dom = FixtureDom::builder()
            .node(
                FixtureNode::element("div")
                    .matching(".player-timebar .timebar-next")
                    .visible(true),
            )
            .node(
                FixtureNode::element("span")
                    .matching(".player-timebar .time-display")
                    .text("00:10 / 01:00")
                    .visible(true),
            )
            .node(FixtureNode::element("button").matching("#next").visible(true))
            .build();

        let ctx = probe().scan(&dom).await.unwrap().unwrap();
        assert_eq!(ctx.family, EngineFamily::TimerGated);
        assert_eq!(ctx.control, NodeId(0));
        assert_eq!(ctx.time_label, Some(NodeId(1)));
    }

    #[tokio::test]
    async fn hidden_timer_control_falls_through_to_attribute_family() {
        let dom = FixtureDom::builder()
            .node(
                FixtureNode::element("div")
                    .matching(".player-timebar .timebar-next")
                    .visible(false),
            )
            .node(FixtureNode::element("button").matching("#next").visible(true))
            .build();

        let ctx = probe().scan(&dom).await.unwrap().unwrap();
        assert_eq!(ctx.family, EngineFamily::AttributeGated);
        assert_eq!(ctx.control, NodeId(1));
    }

    #[tokio::test]
    async fn hidden_decoy_never_beats_visible_lower_priority_control() {
        // "#next" outranks ".next-button" in the selector list, but the
        // hidden decoy must lose to the visible real control.
        let dom = FixtureDom::builder()
            .node(FixtureNode::element("button").matching("#next").visible(false))
            .node(
                FixtureNode::element("div")
                    .matching(".next-button")
                    .visible(true),
            )
            .build();

        let ctx = probe().scan(&dom).await.unwrap().unwrap();
        assert_eq!(ctx.control, NodeId(1));
    }

    #[tokio::test]
    async fn attribute_selector_order_is_stable() {
        let dom = FixtureDom::builder()
            .node(
                FixtureNode::element("div")
                    .matching(".next-button")
                    .visible(true),
            )
            .node(FixtureNode::element("button").matching("#next").visible(true))
            .build();

        // Both visible: "#next" is listed first, so it wins regardless of
        // document order.
        let ctx = probe().scan(&dom).await.unwrap().unwrap();
        assert_eq!(ctx.control, NodeId(1));
    }

    #[tokio::test]
    async fn free_text_fallback_matches_case_normalized_labels() {
        let dom = FixtureDom::builder()
            .node(
                FixtureNode::element("div")
                    .interactive()
                    .text("  dalej ")
                    .visible(true),
            )
            .build();

        let ctx = probe().scan(&dom).await.unwrap().unwrap();
        assert_eq!(ctx.family, EngineFamily::AttributeGated);
        assert_eq!(ctx.control, NodeId(0));
    }

    #[tokio::test]
    async fn free_text_fallback_climbs_to_container() {
        let dom = FixtureDom::builder()
            .node(
                FixtureNode::element("div")
                    .matching(".player-controls")
                    .visible(true),
            )
            .child_node(
                0,
                FixtureNode::element("span")
                    .interactive()
                    .text("NEXT")
                    .visible(true),
            )
            .build();

        let ctx = probe().scan(&dom).await.unwrap().unwrap();
        assert_eq!(ctx.control, NodeId(0), "should climb to the container");
    }

    #[tokio::test]
    async fn free_text_ignores_partial_matches() {
        let dom = FixtureDom::builder()
            .node(
                FixtureNode::element("div")
                    .interactive()
                    .text("NEXT CHAPTER OVERVIEW")
                    .visible(true),
            )
            .build();

        assert!(probe().scan(&dom).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hidden_interactive_text_is_ignored() {
        let dom = FixtureDom::builder()
            .node(
                FixtureNode::element("div")
                    .interactive()
                    .text("NEXT")
                    .visible(false),
            )
            .build();

        assert!(probe().scan(&dom).await.unwrap().is_none());
    }
}
