//! Gate evaluation.
//!
//! Given a candidate control and its engine family, decides whether
//! advancing is currently permitted. Pure with respect to engine state:
//! the decision is a function of the context and live DOM only.

use std::sync::Arc;

use tracing::trace;

use crate::config::EngineConfig;
use crate::dom::{DomSurface, NodeId};
use crate::engine::clock;
use crate::engine::probe::{EngineFamily, PlayerContext};
use crate::error::DomError;

/// Whether advancing is currently permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// No recognizable control in the current DOM snapshot. Not an
    /// error: try again next tick.
    NotFound,
    /// Control found but its gating condition is unmet. The expected
    /// steady state while content plays.
    Locked,
    /// Advancing is permitted.
    Allowed,
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not-found"),
            Self::Locked => write!(f, "locked"),
            Self::Allowed => write!(f, "allowed"),
        }
    }
}

/// Evaluates the gating condition for a detected player.
#[derive(Debug, Clone)]
pub struct GateEvaluator {
    config: Arc<EngineConfig>,
}

impl GateEvaluator {
    /// Creates an evaluator over the configured disabled-class set and
    /// timer tolerance.
    #[must_use]
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Classifies the candidate control.
    ///
    /// A control that disappeared between probe and evaluation yields
    /// `NotFound` for this cycle, not an error.
    ///
    /// # Errors
    ///
    /// Propagates DOM surface failures other than element churn.
    pub async fn evaluate(
        &self,
        dom: &dyn DomSurface,
        ctx: &PlayerContext,
    ) -> Result<GateDecision, DomError> {
        if !dom.is_attached(ctx.control).await? {
            return Ok(GateDecision::NotFound);
        }

        let decision = match ctx.family {
            EngineFamily::AttributeGated => self.evaluate_attribute(dom, ctx.control).await?,
            EngineFamily::TimerGated => self.evaluate_timer(dom, ctx).await?,
        };
        trace!(family = %ctx.family, %decision, "gate evaluated");
        Ok(decision)
    }

    /// Disabled-state check: locked while any disabled class or
    /// `aria-disabled="true"` is present.
    async fn evaluate_attribute(
        &self,
        dom: &dyn DomSurface,
        control: NodeId,
    ) -> Result<GateDecision, DomError> {
        if self.has_disabled_indicator(dom, control).await? {
            Ok(GateDecision::Locked)
        } else {
            Ok(GateDecision::Allowed)
        }
    }

    /// Time-remaining check against the companion label.
    ///
    /// Without a label, falls back to attribute semantics when a disabled
    /// indicator exists, else treats the found control as allowed (the
    /// engine is assumed manually gated elsewhere).
    async fn evaluate_timer(
        &self,
        dom: &dyn DomSurface,
        ctx: &PlayerContext,
    ) -> Result<GateDecision, DomError> {
        let Some(label) = ctx.time_label else {
            return self.evaluate_attribute(dom, ctx.control).await;
        };
        if !dom.is_attached(label).await? {
            return Ok(GateDecision::NotFound);
        }

        let text = dom.text(label).await?;
        let Some((elapsed, total)) = clock::parse_progress(&text) else {
            // No separator at all: treat like a missing label.
            return self.evaluate_attribute(dom, ctx.control).await;
        };

        // A zero total means the clock did not parse. Never advance on
        // ambiguous timer data.
        if total == 0 {
            return Ok(GateDecision::Locked);
        }

        let tolerance = self.config.timer_tolerance_secs;
        if elapsed.saturating_add(tolerance) >= total {
            Ok(GateDecision::Allowed)
        } else {
            Ok(GateDecision::Locked)
        }
    }

    async fn has_disabled_indicator(
        &self,
        dom: &dyn DomSurface,
        control: NodeId,
    ) -> Result<bool, DomError> {
        let classes = dom.classes(control).await?;
        if classes
            .iter()
            .any(|c| self.config.disabled_classes.iter().any(|d| d == c))
        {
            return Ok(true);
        }
        let aria = dom.attribute(control, "aria-disabled").await?;
        Ok(aria.as_deref() == Some("true"))
    }
}
