//! `SlideSkip` — auto-advance engine for gated e-learning slide players.
//!
//! This library provides the detection and gating engine plus the CDP
//! plumbing used by the `slideskip` binary. The engine itself is
//! browser-agnostic: it runs against any [`dom::DomSurface`].

pub mod cli;
pub mod config;
pub mod dom;
pub mod engine;
pub mod error;
pub mod observability;
