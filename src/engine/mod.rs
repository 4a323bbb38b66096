//! Detection and gating engine.
//!
//! The poll cycle runs probe, gate, media keep-alive and synthesizer in a
//! fixed order under the [`controller::AdvanceController`]. Everything in
//! here is written against the [`crate::dom::DomSurface`] trait and is
//! browser-agnostic.

pub mod clock;
pub mod controller;
pub mod gate;
pub mod media;
pub mod probe;
pub mod synth;

pub use controller::{AdvanceController, AdvanceState, CycleOutcome};
pub use gate::{GateDecision, GateEvaluator};
pub use media::{MediaKeepAlive, MediaReport};
pub use probe::{EngineFamily, PlayerContext, PlayerProbe};
pub use synth::{Activation, InteractionSynthesizer};
