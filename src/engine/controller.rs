//! Advance controller.
//!
//! The top-level state machine: runs the poll cycle, wires the probe,
//! gate, media keep-alive and synthesizer together, and enforces
//! at-most-one-advance-per-unlock-opportunity through a cooldown window
//! and an advance fingerprint.
//!
//! Two event sources feed the same transition function: the recurring
//! interval tick and (when the surface supports it) mutation signals on
//! the observed document. Whichever fires first takes the decision; the
//! cooldown and fingerprint guards make the loser's check a no-op, so no
//! mutual exclusion is needed on the single-owner state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::dom::{DomSurface, MutationSignal};
use crate::engine::gate::{GateDecision, GateEvaluator};
use crate::engine::media::MediaKeepAlive;
use crate::engine::probe::{EngineFamily, PlayerContext, PlayerProbe};
use crate::engine::synth::InteractionSynthesizer;
use crate::error::DomError;

/// Debounce state owned exclusively by the controller.
///
/// Lives for the whole session; reset happens implicitly when a new slide
/// context produces a different fingerprint.
#[derive(Debug, Clone, Default)]
pub struct AdvanceState {
    /// End of the current cooldown window, if one is active.
    cooldown_until: Option<Instant>,
    /// Fingerprint of the last unlock opportunity that was advanced.
    last_advance_key: Option<String>,
    /// Consecutive cycles without any candidate, for the keyboard
    /// fallback cadence.
    consecutive_misses: u32,
}

impl AdvanceState {
    /// Whether the cooldown window is still open.
    #[must_use]
    pub fn cooling(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// The fingerprint of the last advance, if any.
    #[must_use]
    pub fn last_advance_key(&self) -> Option<&str> {
        self.last_advance_key.as_deref()
    }
}

/// Outcome of one poll cycle, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The hosting document is a top-level page; the engine is a no-op.
    NotEmbedded,
    /// No recognizable control this cycle.
    NoCandidate {
        /// Whether the blind keyboard fallback fired.
        keyboard_fired: bool,
    },
    /// Control found but the gate is locked.
    Locked,
    /// Gate allowed but the cooldown window is still open.
    Cooling,
    /// Gate allowed but this unlock opportunity was already advanced.
    DuplicateKey,
    /// An advance was dispatched and the cooldown window opened.
    Advanced,
    /// A component failed; the cycle was abandoned and logged.
    Faulted,
}

/// The poll-cycle state machine.
///
/// `Idle → Advancing → Cooling → Idle`, no terminal state; runs for the
/// lifetime of the attached frame.
pub struct AdvanceController {
    dom: Arc<dyn DomSurface>,
    config: Arc<EngineConfig>,
    probe: PlayerProbe,
    gate: GateEvaluator,
    media: MediaKeepAlive,
    synth: InteractionSynthesizer,
    state: AdvanceState,
}

impl AdvanceController {
    /// Creates a controller over a DOM surface.
    #[must_use]
    pub fn new(dom: Arc<dyn DomSurface>, config: Arc<EngineConfig>) -> Self {
        Self {
            probe: PlayerProbe::new(Arc::clone(&config)),
            gate: GateEvaluator::new(Arc::clone(&config)),
            media: MediaKeepAlive::new(),
            synth: InteractionSynthesizer::new(Arc::clone(&config)),
            state: AdvanceState::default(),
            dom,
            config,
        }
    }

    /// Read-only view of the debounce state.
    #[must_use]
    pub const fn state(&self) -> &AdvanceState {
        &self.state
    }

    /// Runs one poll cycle, isolating any component failure.
    ///
    /// This is the cycle boundary from the error-propagation policy: a
    /// failing component is logged and swallowed so the next tick starts
    /// from clean state.
    pub async fn tick(&mut self) -> CycleOutcome {
        match self.cycle().await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "poll cycle failed; will retry next tick");
                CycleOutcome::Faulted
            }
        }
    }

    /// Runs the poll loop until cancelled.
    ///
    /// Subscribes to mutation signals when the surface offers them; both
    /// the interval tick and a signal trigger the same [`Self::tick`].
    pub async fn run(&mut self, cancel: CancellationToken) {
        let mut mutations = match self.dom.watch_mutations().await {
            Ok(receiver) => receiver,
            Err(err) => {
                warn!(error = %err, "mutation subscription failed; polling only");
                None
            }
        };

        let mut interval = tokio::time::interval(self.config.timing.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            poll_interval = ?self.config.timing.poll_interval,
            mutation_driven = mutations.is_some(),
            "advance controller started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("advance controller cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
                Some(MutationSignal) = recv_signal(&mut mutations) => {
                    self.tick().await;
                }
            }
        }
    }

    async fn cycle(&mut self) -> Result<CycleOutcome, DomError> {
        if !self.dom.is_embedded().await? {
            return Ok(CycleOutcome::NotEmbedded);
        }

        // Media first, every cycle. Time-gated unlocks depend on it.
        self.media.nudge(self.dom.as_ref()).await?;

        let Some(ctx) = self.probe.scan(self.dom.as_ref()).await? else {
            let keyboard_fired = self.handle_miss().await?;
            return Ok(CycleOutcome::NoCandidate { keyboard_fired });
        };
        self.state.consecutive_misses = 0;

        match self.gate.evaluate(self.dom.as_ref(), &ctx).await? {
            GateDecision::NotFound => Ok(CycleOutcome::NoCandidate {
                keyboard_fired: false,
            }),
            GateDecision::Locked => Ok(CycleOutcome::Locked),
            GateDecision::Allowed => self.try_advance(&ctx).await,
        }
    }

    /// Guards and fires the advance: never while cooling, never twice for
    /// the same fingerprint.
    async fn try_advance(&mut self, ctx: &PlayerContext) -> Result<CycleOutcome, DomError> {
        let now = Instant::now();
        if self.state.cooling(now) {
            return Ok(CycleOutcome::Cooling);
        }

        let key = self.fingerprint(ctx).await?;
        if self.state.last_advance_key.as_deref() == Some(key.as_str()) {
            debug!(key, "unlock opportunity already advanced");
            return Ok(CycleOutcome::DuplicateKey);
        }

        let activation = self.synth.advance(self.dom.as_ref(), ctx.control).await?;
        self.state.last_advance_key = Some(key);
        self.state.cooldown_until = Some(now + self.config.timing.cooldown);

        info!(
            family = %ctx.family,
            control = %ctx.control,
            ?activation,
            cooldown = ?self.config.timing.cooldown,
            "slide advanced"
        );
        Ok(CycleOutcome::Advanced)
    }

    /// Identifies the current unlock opportunity.
    ///
    /// Timer players expose it directly as the label text; attribute
    /// players have no label, so the slide content signature stands in.
    async fn fingerprint(&self, ctx: &PlayerContext) -> Result<String, DomError> {
        match (ctx.family, ctx.time_label) {
            (EngineFamily::TimerGated, Some(label)) => {
                let text = self.dom.text(label).await?;
                Ok(format!("timer:{}", text.trim()))
            }
            _ => {
                let signature = self.dom.context_signature().await?;
                Ok(format!("ctx:{signature}"))
            }
        }
    }

    /// Counts a no-candidate cycle and fires the blind keyboard fallback
    /// on the configured cadence, respecting the cooldown window.
    async fn handle_miss(&mut self) -> Result<bool, DomError> {
        self.state.consecutive_misses = self.state.consecutive_misses.saturating_add(1);

        let fallback = &self.config.keyboard_fallback;
        if !fallback.enabled
            || fallback.every_misses == 0
            || !self
                .state
                .consecutive_misses
                .is_multiple_of(fallback.every_misses)
        {
            return Ok(false);
        }
        if self.state.cooling(Instant::now()) {
            return Ok(false);
        }

        self.synth.keyboard_next(self.dom.as_ref()).await?;
        Ok(true)
    }
}

impl std::fmt::Debug for AdvanceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvanceController")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Awaits a mutation signal; pends forever when the surface has none so
/// the select arm simply never fires.
async fn recv_signal(
    mutations: &mut Option<mpsc::UnboundedReceiver<MutationSignal>>,
) -> Option<MutationSignal> {
    match mutations {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeId;
    use crate::dom::fixture::{FixtureDom, FixtureNode, RecordedEvent};
    use std::time::Duration;

    fn test_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.timing.settle_delay = Duration::ZERO;
        config.timing.cooldown = Duration::from_millis(2500);
        config
    }

    fn controller(dom: &Arc<FixtureDom>, config: EngineConfig) -> AdvanceController {
        let surface: Arc<dyn DomSurface> = Arc::clone(dom) as Arc<dyn DomSurface>;
        AdvanceController::new(surface, Arc::new(config))
    }

    fn allowed_button() -> FixtureDom {
        FixtureDom::builder()
            .embedded(true)
            .node(FixtureNode::element("button").matching("#next").visible(true))
            .build()
    }

    fn activation_count(dom: &FixtureDom) -> usize {
        dom.recorded_events()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    RecordedEvent::NativeActivate(_) | RecordedEvent::SyntheticClick(_)
                )
            })
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn top_level_page_is_a_noop() {
        let dom = Arc::new(
            FixtureDom::builder()
                .embedded(false)
                .node(FixtureNode::element("button").matching("#next").visible(true))
                .build(),
        );
        let mut ctl = controller(&dom, test_config());
        assert_eq!(ctl.tick().await, CycleOutcome::NotEmbedded);
        assert_eq!(activation_count(&dom), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn allowed_candidate_is_advanced_once() {
        let dom = Arc::new(allowed_button());
        let mut ctl = controller(&dom, test_config());

        assert_eq!(ctl.tick().await, CycleOutcome::Advanced);
        assert_eq!(activation_count(&dom), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_blocks_immediate_re_advance() {
        let dom = Arc::new(allowed_button());
        let mut ctl = controller(&dom, test_config());

        assert_eq!(ctl.tick().await, CycleOutcome::Advanced);
        assert_eq!(ctl.tick().await, CycleOutcome::Cooling);
        assert_eq!(activation_count(&dom), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fingerprint_blocks_after_cooldown_expires() {
        let dom = Arc::new(allowed_button());
        let mut ctl = controller(&dom, test_config());

        assert_eq!(ctl.tick().await, CycleOutcome::Advanced);
        tokio::time::advance(Duration::from_secs(3)).await;
        // Cooldown expired but the slide signature is unchanged: still
        // the same unlock opportunity.
        assert_eq!(ctl.tick().await, CycleOutcome::DuplicateKey);
        assert_eq!(activation_count(&dom), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_slide_signature_re_arms_the_engine() {
        let dom = Arc::new(allowed_button());
        let mut ctl = controller(&dom, test_config());

        assert_eq!(ctl.tick().await, CycleOutcome::Advanced);
        tokio::time::advance(Duration::from_secs(3)).await;
        dom.set_context_signature("slide-2");
        assert_eq!(ctl.tick().await, CycleOutcome::Advanced);
        assert_eq!(activation_count(&dom), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn locked_gate_waits_without_touching_state() {
        let dom = Arc::new(
            FixtureDom::builder()
                .embedded(true)
                .node(
                    FixtureNode::element("button")
                        .matching("#next")
                        .class("disabled")
                        .visible(true),
                )
                .build(),
        );
        let mut ctl = controller(&dom, test_config());

        assert_eq!(ctl.tick().await, CycleOutcome::Locked);
        assert_eq!(ctl.tick().await, CycleOutcome::Locked);
        assert!(ctl.state().last_advance_key().is_none());
        assert_eq!(activation_count(&dom), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unlock_after_locked_ticks_advances_on_the_next_tick() {
        let dom = Arc::new(
            FixtureDom::builder()
                .embedded(true)
                .node(
                    FixtureNode::element("button")
                        .matching("#next")
                        .class("disabled")
                        .visible(true),
                )
                .build(),
        );
        let mut ctl = controller(&dom, test_config());

        for _ in 0..3 {
            assert_eq!(ctl.tick().await, CycleOutcome::Locked);
        }
        dom.remove_class(NodeId(0), "disabled");
        assert_eq!(ctl.tick().await, CycleOutcome::Advanced);
        assert_eq!(activation_count(&dom), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_label_does_not_double_advance() {
        // After the click the label still reads "finished" for a poll or
        // two before the next slide loads.
        let dom = Arc::new(
            FixtureDom::builder()
                .embedded(true)
                .node(
                    FixtureNode::element("div")
                        .matching(".player-timebar .timebar-next")
                        .visible(true),
                )
                .node(
                    FixtureNode::element("span")
                        .matching(".player-timebar .time-display")
                        .text("01:25 / 01:25")
                        .visible(true),
                )
                .build(),
        );
        let mut ctl = controller(&dom, test_config());

        assert_eq!(ctl.tick().await, CycleOutcome::Advanced);
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(ctl.tick().await, CycleOutcome::DuplicateKey);

        // The next slide's timer restarts: a fresh opportunity.
        dom.set_text(NodeId(1), "00:00 / 00:30");
        assert_eq!(ctl.tick().await, CycleOutcome::Locked);
        dom.set_text(NodeId(1), "00:30 / 00:30");
        assert_eq!(ctl.tick().await, CycleOutcome::Advanced);
        assert_eq!(activation_count(&dom), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn keyboard_fallback_fires_on_cadence() {
        let dom = Arc::new(FixtureDom::builder().embedded(true).build());
        let mut ctl = controller(&dom, test_config());

        for i in 1..=3 {
            assert_eq!(
                ctl.tick().await,
                CycleOutcome::NoCandidate {
                    keyboard_fired: false
                },
                "tick {i}"
            );
        }
        assert_eq!(
            ctl.tick().await,
            CycleOutcome::NoCandidate {
                keyboard_fired: true
            }
        );
        assert_eq!(dom.recorded_events(), vec![RecordedEvent::NextKey]);
    }

    #[tokio::test(start_paused = true)]
    async fn keyboard_fallback_can_be_disabled() {
        let mut config = test_config();
        config.keyboard_fallback.enabled = false;
        let dom = Arc::new(FixtureDom::builder().embedded(true).build());
        let mut ctl = controller(&dom, config);

        for _ in 0..8 {
            ctl.tick().await;
        }
        assert!(dom.recorded_events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn component_failure_is_swallowed() {
        let dom = Arc::new(allowed_button());
        dom.fail_next_query("probe blew up");
        let mut ctl = controller(&dom, test_config());

        assert_eq!(ctl.tick().await, CycleOutcome::Faulted);
        // Next tick starts clean and succeeds.
        assert_eq!(ctl.tick().await, CycleOutcome::Advanced);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_stops_on_cancellation() {
        let dom = Arc::new(allowed_button());
        let mut ctl = controller(&dom, test_config());
        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { ctl.run(cancel).await })
        };

        tokio::time::advance(Duration::from_millis(1100)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(activation_count(&dom), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn mutation_signal_triggers_a_cycle_between_ticks() {
        let dom = Arc::new(
            FixtureDom::builder()
                .embedded(true)
                .node(
                    FixtureNode::element("button")
                        .matching("#next")
                        .class("disabled")
                        .visible(true),
                )
                .build(),
        );
        let signals = dom.mutation_sender();
        let mut ctl = controller(&dom, test_config());
        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { ctl.run(cancel).await })
        };

        // Let the startup tick land while the control is still locked.
        tokio::time::advance(Duration::from_millis(10)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(activation_count(&dom), 0);

        // Unlock and signal; the engine reacts without waiting a tick.
        dom.remove_class(NodeId(0), "disabled");
        signals.send(MutationSignal).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(activation_count(&dom), 1);

        cancel.cancel();
        handle.await.unwrap();
    }
}
