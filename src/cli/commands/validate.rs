//! The `validate` command.
//!
//! Checks configuration files without attaching to a browser.

use tracing::{info, warn};

use crate::cli::args::ValidateArgs;
use crate::config::loader;
use crate::error::{ConfigError, Severity, SlideSkipError, ValidationIssue};

/// Validate configuration files.
///
/// # Errors
///
/// Returns a config error for the first file that fails to parse or
/// validate. With `--strict`, warnings fail the file too.
pub fn run(args: &ValidateArgs) -> Result<(), SlideSkipError> {
    for path in &args.files {
        info!(file = %path.display(), "validating configuration");
        let result = loader::load(path)?;

        for warning in &result.warnings {
            warn!(file = %path.display(), "{warning}");
        }

        if args.strict && !result.warnings.is_empty() {
            return Err(ConfigError::ValidationError {
                path: path.display().to_string(),
                errors: result
                    .warnings
                    .iter()
                    .map(|w| ValidationIssue {
                        path: path.display().to_string(),
                        message: format!("strict mode: {w}"),
                        severity: Severity::Error,
                    })
                    .collect(),
            }
            .into());
        }

        info!(file = %path.display(), "configuration valid");
    }
    Ok(())
}
