//! Configuration loader.
//!
//! Loading pipeline:
//! 1. Read the YAML file (or start from defaults when no file is given)
//! 2. Parse and deserialize to the typed schema
//! 3. Apply `SLIDESKIP_*` environment overrides
//! 4. Validate
//! 5. Freeze with `Arc`

use std::path::Path;
use std::sync::Arc;

use crate::config::schema::EngineConfig;
use crate::error::{ConfigError, Severity};

/// Result of loading a configuration.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: Arc<EngineConfig>,

    /// Non-fatal issues encountered during loading.
    pub warnings: Vec<String>,
}

/// Loads a configuration file and returns the frozen configuration.
///
/// Validation warnings are returned alongside the config; validation
/// errors fail the load.
///
/// # Errors
///
/// Returns [`ConfigError::MissingFile`] when the path does not exist,
/// [`ConfigError::ParseError`] when the YAML is malformed, and
/// [`ConfigError::ValidationError`] when validation finds errors.
pub fn load(path: &Path) -> Result<LoadResult, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut config: EngineConfig =
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    apply_env_overrides(&mut config);
    freeze(config, &path.display().to_string())
}

/// Builds a configuration without a file: defaults plus environment
/// overrides. Used when `run` is invoked with no `--config`.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] if the overridden defaults
/// fail validation.
pub fn load_defaults() -> Result<LoadResult, ConfigError> {
    let mut config = EngineConfig::default();
    apply_env_overrides(&mut config);
    freeze(config, "<defaults>")
}

fn freeze(config: EngineConfig, origin: &str) -> Result<LoadResult, ConfigError> {
    let issues = config.validate();
    let (errors, warnings): (Vec<_>, Vec<_>) = issues
        .into_iter()
        .partition(|i| i.severity == Severity::Error);

    if !errors.is_empty() {
        return Err(ConfigError::ValidationError {
            path: origin.to_string(),
            errors,
        });
    }

    Ok(LoadResult {
        config: Arc::new(config),
        warnings: warnings.into_iter().map(|i| i.to_string()).collect(),
    })
}

/// Applies `SLIDESKIP_*` environment overrides to a parsed configuration.
///
/// Only the externally togglable knobs are exposed this way; everything
/// else goes through the file.
fn apply_env_overrides(config: &mut EngineConfig) {
    if let Ok(v) = std::env::var("SLIDESKIP_ENABLED") {
        config.enabled = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
    }
    if let Ok(v) = std::env::var("SLIDESKIP_POLL_INTERVAL")
        && let Ok(d) = humantime::parse_duration(&v)
    {
        config.timing.poll_interval = d;
    }
    if let Ok(v) = std::env::var("SLIDESKIP_COOLDOWN")
        && let Ok(d) = humantime::parse_duration(&v)
    {
        config.timing.cooldown = d;
    }
    if let Ok(v) = std::env::var("SLIDESKIP_CONNECT_URL") {
        config.browser.connect_url = Some(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn load_missing_file_fails() {
        let err = load(Path::new("/nonexistent/slideskip.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[test]
    fn load_minimal_config() {
        let file = write_config("enabled: true\n");
        let result = load(file.path()).unwrap();
        assert!(result.config.enabled);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn load_malformed_yaml_fails() {
        let file = write_config("enabled: [unterminated\n");
        let err = load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn load_reports_validation_errors() {
        let file = write_config("timing:\n  cooldown: 0s\n");
        let err = load(file.path()).unwrap_err();
        match err {
            ConfigError::ValidationError { errors, .. } => {
                assert!(errors.iter().any(|i| i.path == "timing.cooldown"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn load_surfaces_warnings_without_failing() {
        let file = write_config("next_labels: []\n");
        let result = load(file.path()).unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("next_labels"));
    }

    #[test]
    fn load_defaults_is_valid() {
        // Not exercising env overrides here: the process environment is
        // shared across the test binary.
        let result = load_defaults().unwrap();
        assert!(result.config.enabled);
    }
}
