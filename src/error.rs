//! Error types for `SlideSkip`.
//!
//! One top-level error aggregating the per-domain hierarchies, plus the
//! Unix exit-code mapping used by the CLI.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `SlideSkip` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Browser error (launch failed, CDP connection lost)
    pub const BROWSER_ERROR: i32 = 4;

    /// Engine error (DOM surface failure outside a poll cycle)
    pub const ENGINE_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `SlideSkip` operations.
///
/// Aggregates all domain-specific errors and provides a unified
/// interface for error handling and exit-code mapping.
#[derive(Debug, Error)]
pub enum SlideSkipError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Browser session error
    #[error(transparent)]
    Browser(#[from] BrowserError),

    /// DOM surface error
    #[error(transparent)]
    Dom(#[from] DomError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SlideSkipError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Browser(_) => ExitCode::BROWSER_ERROR,
            Self::Dom(_) => ExitCode::ENGINE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}")]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "selectors.attribute_controls")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Validation failure that prevents the configuration from being used
    Error,
    /// Potential issue that does not prevent configuration loading
    Warning,
}

// ============================================================================
// Browser Session Errors
// ============================================================================

/// Browser session errors for launching or attaching over CDP.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Browser process failed to launch
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    /// DevTools websocket connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// CDP protocol-level error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No browser target specified (neither --connect nor --launch)
    #[error("no browser target: {0}")]
    NoTarget(String),
}

// ============================================================================
// DOM Surface Errors
// ============================================================================

/// DOM surface errors.
///
/// These are the only failures that cross engine component boundaries.
/// The advance controller swallows them at the poll-cycle boundary so a
/// failing tick never takes the engine down.
#[derive(Debug, Error)]
pub enum DomError {
    /// A script evaluation against the page failed
    #[error("evaluation failed: {0}")]
    Eval(String),

    /// A previously resolved element is no longer attached
    #[error("node is no longer attached to the document")]
    NodeGone,

    /// The page returned a value of an unexpected shape
    #[error("unexpected value from page: {0}")]
    BadValue(String),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `SlideSkip` operations.
pub type Result<T> = std::result::Result<T, SlideSkipError>;

// ============================================================================
// Tests
// ============================================================================
