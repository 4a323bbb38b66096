//! Synthetic interaction sequencing.
//!
//! Dispatches the hover-then-press pointer sequence a player expects from
//! a real user, then issues exactly one terminal activation. Duplicate
//! terminal activations are the classic cause of skipped slides, so the
//! native-activation and synthetic-click paths are mutually exclusive.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::EngineConfig;
use crate::dom::{DomSurface, MousePhase, NodeId};
use crate::error::DomError;

/// How the terminal activation was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Native `click()` on a focusable interactive element.
    Native(NodeId),
    /// Synthetic `click` event on the candidate itself.
    Synthetic(NodeId),
}

/// Produces the ordered synthetic input a player reacts to.
#[derive(Debug, Clone)]
pub struct InteractionSynthesizer {
    config: Arc<EngineConfig>,
}

impl InteractionSynthesizer {
    /// Creates a synthesizer with the configured settle delay between
    /// pointer phases.
    #[must_use]
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Fires the full interaction at a candidate control:
    /// `mouseover → mouseenter → mousedown → mouseup`, then one terminal
    /// activation: native on the resolved clickable element when one
    /// exists, otherwise a synthetic `click` on the target.
    ///
    /// # Errors
    ///
    /// Propagates DOM surface failures (including the target vanishing
    /// mid-sequence); the controller swallows these at the cycle boundary.
    pub async fn advance(
        &self,
        dom: &dyn DomSurface,
        target: NodeId,
    ) -> Result<Activation, DomError> {
        let settle = self.config.timing.settle_delay;
        for phase in MousePhase::sequence() {
            dom.dispatch_mouse(target, phase).await?;
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }
        }

        let activation = match dom.activation_target(target).await? {
            Some(clickable) => {
                dom.activate(clickable).await?;
                Activation::Native(clickable)
            }
            None => {
                dom.dispatch_click(target).await?;
                Activation::Synthetic(target)
            }
        };
        debug!(%target, ?activation, "synthetic interaction dispatched");
        Ok(activation)
    }

    /// Blind keyboard fallback for canvas-rendered players: the
    /// ArrowRight keydown/keyup pair on the document body.
    ///
    /// # Errors
    ///
    /// Propagates DOM surface failures.
    pub async fn keyboard_next(&self, dom: &dyn DomSurface) -> Result<(), DomError> {
        debug!("keyboard fallback dispatched");
        dom.dispatch_next_key().await
    }

    /// The configured pause between pointer phases.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        self.config.timing.settle_delay
    }
}
