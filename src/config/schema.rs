//! Configuration schema types.
//!
//! Deserialized from YAML configuration files. Every timing value the
//! engine uses is named here rather than hard-coded: the cooldown and
//! settle windows are an interface the host environment may tune.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Severity, ValidationIssue};

// ============================================================================
// Top-Level Configuration
// ============================================================================

/// Root configuration for a `SlideSkip` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct EngineConfig {
    /// The single persisted on/off preference. When false the engine
    /// honors it by never starting its poll loop.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Named timing parameters.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Seconds of slack when comparing elapsed against total time,
    /// absorbing renderer rounding in the displayed clock.
    #[serde(default = "default_timer_tolerance")]
    pub timer_tolerance_secs: u32,

    /// Detection selectors per engine family.
    #[serde(default)]
    pub selectors: SelectorConfig,

    /// Class names that mark a control as disabled.
    #[serde(default = "default_disabled_classes")]
    pub disabled_classes: Vec<String>,

    /// Case-normalized "next" labels for the free-text fallback.
    #[serde(default = "default_next_labels")]
    pub next_labels: Vec<String>,

    /// Blind keyboard fallback for canvas-rendered players.
    #[serde(default)]
    pub keyboard_fallback: KeyboardFallback,

    /// Browser attach/launch settings.
    #[serde(default)]
    pub browser: BrowserSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timing: TimingConfig::default(),
            timer_tolerance_secs: default_timer_tolerance(),
            selectors: SelectorConfig::default(),
            disabled_classes: default_disabled_classes(),
            next_labels: default_next_labels(),
            keyboard_fallback: KeyboardFallback::default(),
            browser: BrowserSettings::default(),
        }
    }
}

// ============================================================================
// Timing
// ============================================================================

/// Named timing parameters for the poll loop and debounce windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct TimingConfig {
    /// Period of the recurring poll cycle.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Window after an advance during which no further advance is
    /// attempted. Long enough for the next slide's DOM to settle, short
    /// enough not to miss a real unlock.
    #[serde(default = "default_cooldown", with = "humantime_serde")]
    pub cooldown: Duration,

    /// Pause between the pointer phases of a synthetic interaction.
    #[serde(default = "default_settle_delay", with = "humantime_serde")]
    pub settle_delay: Duration,

    /// Drain period for the injected mutation observer.
    #[serde(default = "default_mutation_poll", with = "humantime_serde")]
    pub mutation_poll: Duration,

    /// How often the browser session re-scans for new page targets.
    #[serde(default = "default_rescan_interval", with = "humantime_serde")]
    pub rescan_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            cooldown: default_cooldown(),
            settle_delay: default_settle_delay(),
            mutation_poll: default_mutation_poll(),
            rescan_interval: default_rescan_interval(),
        }
    }
}

// ============================================================================
// Selectors
// ============================================================================

/// Detection selectors, in probe priority order: the timer-family
/// container first, then the attribute-family list, then the free-text
/// fallback over interactive elements with an ancestor climb to the
/// nearest recognizable container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct SelectorConfig {
    /// Control element of the timer-gated family.
    #[serde(default = "default_timer_control")]
    pub timer_control: String,

    /// Companion elapsed/total display of the timer-gated family.
    #[serde(default = "default_timer_label")]
    pub timer_label: String,

    /// Ordered id/class/aria selectors for the attribute-gated engines.
    #[serde(default = "default_attribute_controls")]
    pub attribute_controls: Vec<String>,

    /// Container classes the free-text fallback climbs toward.
    #[serde(default = "default_containers")]
    pub containers: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            timer_control: default_timer_control(),
            timer_label: default_timer_label(),
            attribute_controls: default_attribute_controls(),
            containers: default_containers(),
        }
    }
}

// ============================================================================
// Keyboard Fallback
// ============================================================================

/// Blind ArrowRight fallback for players that render their controls to a
/// canvas and expose nothing matchable in the DOM.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct KeyboardFallback {
    /// Whether the fallback is active.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fire after this many consecutive no-candidate cycles.
    #[serde(default = "default_every_misses")]
    pub every_misses: u32,
}

impl Default for KeyboardFallback {
    fn default() -> Self {
        Self {
            enabled: true,
            every_misses: default_every_misses(),
        }
    }
}

// ============================================================================
// Browser Settings
// ============================================================================

/// Browser attach/launch settings.
///
/// Exactly one of `connect_url` or `launch` should be active; validation
/// flags a configuration that enables both.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct BrowserSettings {
    /// DevTools websocket URL of an already-running browser.
    #[serde(default)]
    pub connect_url: Option<String>,

    /// Launch a browser process instead of attaching.
    #[serde(default)]
    pub launch: bool,

    /// Path to the Chromium executable (launch mode).
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Run the launched browser headless.
    #[serde(default)]
    pub headless: bool,
}

// ============================================================================
// Validation
// ============================================================================

impl EngineConfig {
    /// Validates the configuration, returning every issue found.
    ///
    /// An empty result means the configuration is usable; warnings alone
    /// do not prevent a run.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.timing.poll_interval.is_zero() {
            issues.push(ValidationIssue {
                path: "timing.poll_interval".to_string(),
                message: "poll interval must be non-zero".to_string(),
                severity: Severity::Error,
            });
        }

        if self.timing.cooldown.is_zero() {
            issues.push(ValidationIssue {
                path: "timing.cooldown".to_string(),
                message: "cooldown must be non-zero to debounce advances".to_string(),
                severity: Severity::Error,
            });
        }

        if self.timing.cooldown < self.timing.poll_interval {
            issues.push(ValidationIssue {
                path: "timing.cooldown".to_string(),
                message: "cooldown shorter than the poll interval cannot debounce".to_string(),
                severity: Severity::Warning,
            });
        }

        if self.selectors.attribute_controls.is_empty() && self.selectors.timer_control.is_empty() {
            issues.push(ValidationIssue {
                path: "selectors".to_string(),
                message: "no detection selectors configured; nothing will ever match".to_string(),
                severity: Severity::Error,
            });
        }

        if self.next_labels.is_empty() {
            issues.push(ValidationIssue {
                path: "next_labels".to_string(),
                message: "empty label set disables the free-text fallback".to_string(),
                severity: Severity::Warning,
            });
        }

        if self.keyboard_fallback.enabled && self.keyboard_fallback.every_misses == 0 {
            issues.push(ValidationIssue {
                path: "keyboard_fallback.every_misses".to_string(),
                message: "must be at least 1 when the fallback is enabled".to_string(),
                severity: Severity::Error,
            });
        }

        if self.browser.connect_url.is_some() && self.browser.launch {
            issues.push(ValidationIssue {
                path: "browser".to_string(),
                message: "connect_url and launch are mutually exclusive".to_string(),
                severity: Severity::Error,
            });
        }

        issues
    }
}

// ============================================================================
// Defaults
// ============================================================================

const fn default_true() -> bool {
    true
}

const fn default_timer_tolerance() -> u32 {
    1
}

const fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

const fn default_cooldown() -> Duration {
    // Articulate needs the full window before the next slide settles.
    Duration::from_millis(2500)
}

const fn default_settle_delay() -> Duration {
    Duration::from_millis(50)
}

const fn default_mutation_poll() -> Duration {
    Duration::from_millis(150)
}

const fn default_rescan_interval() -> Duration {
    Duration::from_secs(5)
}

const fn default_every_misses() -> u32 {
    4
}

fn default_timer_control() -> String {
    ".player-timebar .timebar-next".to_string()
}

fn default_timer_label() -> String {
    ".player-timebar .time-display".to_string()
}

fn default_attribute_controls() -> Vec<String> {
    [
        // Articulate / Storyline
        "#next",
        "#linkNext",
        "button[aria-label=\"Next\"]",
        "button[aria-label=\"Dalej\"]",
        // iSpring
        ".next-button",
        ".tech_next_btn",
        "div[title=\"Next\"]",
        "div[title=\"Dalej\"]",
        ".player_navbar_right_control",
        ".ispring-button-next",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_containers() -> Vec<String> {
    [
        ".player-controls",
        ".navbar",
        ".nav-buttons",
        ".universal-toolbar",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_disabled_classes() -> Vec<String> {
    ["cs-disabled", "disabled", "blocked", "hidden", "state-disabled"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_next_labels() -> Vec<String> {
    ["NEXT", "DALEJ", "WEITER", "SUIVANT", "SIGUIENTE"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

// ============================================================================
// Duration (de)serialization
// ============================================================================

/// Serde adapter for humantime duration strings ("1s", "2500ms").
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================
