#![forbid(unsafe_code)]

//! Scheduler configuration.
//!
//! [`SchedulerConfig`] has sensible defaults, can be overridden from the
//! environment with [`SchedulerConfig::from_env`], and (with the
//! `policy-config` feature) loaded from TOML or JSON.
//!
//! # Environment
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `DEBTBOOK_RENDER_ENABLED` | start with rendering enabled |
//! | `DEBTBOOK_RENDER_TRACE` | emit a diagnostic for every marked batch |
//!
//! Truthy values are `1`, `true`, `yes` and `on` (case-insensitive);
//! `0`, `false`, `no` and `off` are falsy. Anything else leaves the default.

use std::env;
use std::fmt;

/// What to do when a different renderer is registered for a bound key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "policy-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum ConflictPolicy {
    /// Last write wins, with a warning.
    #[default]
    Replace,
    /// Keep the existing renderer and return an error.
    Reject,
}

/// Tunables for a [`RenderScheduler`](crate::RenderScheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "policy-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default, deny_unknown_fields, rename_all = "kebab-case")
)]
pub struct SchedulerConfig {
    /// Whether flushes render from the start. When `false` the scheduler
    /// stays in registration-only mode until [`enable`] is called.
    /// Default: false
    ///
    /// [`enable`]: crate::RenderScheduler::enable
    pub start_enabled: bool,

    /// Emit [`Diagnostic::Marked`](crate::Diagnostic::Marked) for each
    /// invalidation batch.
    /// Default: false
    pub trace: bool,

    /// Policy for conflicting registrations.
    /// Default: [`ConflictPolicy::Replace`]
    pub conflict_policy: ConflictPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            start_enabled: false,
            trace: false,
            conflict_policy: ConflictPolicy::Replace,
        }
    }
}

impl SchedulerConfig {
    /// Enable or disable rendering at startup.
    #[must_use]
    pub fn start_enabled(mut self, enabled: bool) -> Self {
        self.start_enabled = enabled;
        self
    }

    /// Enable or disable trace diagnostics.
    #[must_use]
    pub fn trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Set the conflicting-registration policy.
    #[must_use]
    pub fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Defaults overridden by `DEBTBOOK_RENDER_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let enabled = env::var("DEBTBOOK_RENDER_ENABLED").ok();
        let trace = env::var("DEBTBOOK_RENDER_TRACE").ok();
        Self::default().with_overrides(enabled.as_deref(), trace.as_deref())
    }

    fn with_overrides(mut self, enabled: Option<&str>, trace: Option<&str>) -> Self {
        if let Some(v) = enabled.and_then(parse_flag) {
            self.start_enabled = v;
        }
        if let Some(v) = trace.and_then(parse_flag) {
            self.trace = v;
        }
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Errors from loading a [`SchedulerConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The document could not be parsed.
    Parse(String),
    /// The file extension is neither `.toml` nor `.json`.
    UnsupportedFormat(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read scheduler config: {e}"),
            Self::Parse(msg) => write!(f, "invalid scheduler config: {msg}"),
            Self::UnsupportedFormat(ext) => {
                write!(f, "unsupported scheduler config format: {ext:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "policy-config")]
impl SchedulerConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed input or unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed input or unknown fields.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a `.toml` or `.json` file, chosen by extension.
    ///
    /// # Errors
    ///
    /// I/O, parse, or unsupported-extension errors.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Self::from_toml_str(&std::fs::read_to_string(path)?),
            "json" => Self::from_json_str(&std::fs::read_to_string(path)?),
            _ => Err(ConfigError::UnsupportedFormat(ext)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_start_passive() {
        let cfg = SchedulerConfig::default();
        assert!(!cfg.start_enabled);
        assert!(!cfg.trace);
        assert_eq!(cfg.conflict_policy, ConflictPolicy::Replace);
    }

    #[test]
    fn overrides_parse_truthy_and_falsy() {
        let cfg = SchedulerConfig::default().with_overrides(Some("YES"), Some("on"));
        assert!(cfg.start_enabled);
        assert!(cfg.trace);

        let cfg = SchedulerConfig::default()
            .trace(true)
            .with_overrides(None, Some("0"));
        assert!(!cfg.trace);
    }

    #[test]
    fn unrecognized_override_keeps_default() {
        let cfg = SchedulerConfig::default().with_overrides(Some("maybe"), Some(""));
        assert_eq!(cfg, SchedulerConfig::default());
    }

    #[test]
    fn builder_methods_chain() {
        let cfg = SchedulerConfig::default()
            .start_enabled(true)
            .conflict_policy(ConflictPolicy::Reject);
        assert!(cfg.start_enabled);
        assert_eq!(cfg.conflict_policy, ConflictPolicy::Reject);
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn toml_and_json_load() {
        let cfg = SchedulerConfig::from_toml_str(
            "start-enabled = true\nconflict-policy = \"reject\"\n",
        )
        .unwrap();
        assert!(cfg.start_enabled);
        assert!(!cfg.trace);
        assert_eq!(cfg.conflict_policy, ConflictPolicy::Reject);

        let cfg = SchedulerConfig::from_json_str(r#"{"trace": true}"#).unwrap();
        assert!(cfg.trace);
        assert!(!cfg.start_enabled);
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn unknown_fields_are_rejected() {
        let err = SchedulerConfig::from_toml_str("flush-budget = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn load_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("render.toml");
        std::fs::write(&toml_path, "trace = true\n").unwrap();
        assert!(SchedulerConfig::load(&toml_path).unwrap().trace);

        let yaml_path = dir.path().join("render.yaml");
        std::fs::write(&yaml_path, "trace: true\n").unwrap();
        assert!(matches!(
            SchedulerConfig::load(&yaml_path),
            Err(ConfigError::UnsupportedFormat(_))
        ));

        let missing = dir.path().join("absent.json");
        assert!(matches!(
            SchedulerConfig::load(&missing),
            Err(ConfigError::Io(_))
        ));
    }
}
