//! Observability module.
//!
//! Structured logging for the detection engine. All diagnostics go to
//! stderr so stdout stays clean for command output.

pub mod logging;

pub use logging::{LogFormat, init_logging};
