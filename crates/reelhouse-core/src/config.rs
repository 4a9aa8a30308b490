//! Configuration system for reelhouse.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Error;

/// Main configuration struct for reelhouse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Recording output settings
    pub recording: RecordingConfig,
    /// Who gets recorded
    pub filter: FilterConfig,
    /// Old archive cleanup
    pub retention: RetentionConfig,
    /// Instant replay settings
    pub instant_replay: InstantReplayConfig,
    /// Session behaviour
    pub session: SessionConfig,
    /// Notification settings
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Root directory; day partitions are created beneath it
    pub root: PathBuf,
    /// Archive file extension, without the dot
    pub extension: String,
    /// Server name written into archive metadata
    pub server_name: String,
    /// Protocol version written into archive metadata
    pub protocol_version: u32,
    /// Host version string written into archive metadata
    pub host_version: String,
    /// Minimum custom label length
    pub custom_label_min: usize,
    /// Maximum custom label length
    pub custom_label_max: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("replay/recordings"),
            extension: "mcpr".to_string(),
            server_name: "localhost".to_string(),
            protocol_version: 0,
            host_version: "unknown".to_string(),
            custom_label_min: 5,
            custom_label_max: 16,
        }
    }
}

/// Filter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordMode {
    /// Record everyone except listed subjects
    #[default]
    Blacklist,
    /// Record only listed subjects
    Whitelist,
}

/// Which subject attribute filter entries match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckBy {
    #[default]
    Name,
    Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// blacklist or whitelist
    pub mode: RecordMode,
    /// name or uuid
    pub check_by: CheckBy,
    /// Subjects never recorded in blacklist mode
    pub blacklist: Vec<String>,
    /// Subjects recorded in whitelist mode
    pub whitelist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Enable the periodic sweep
    pub auto_cleanup: bool,
    /// Archives older than this many days are deleted; `<= 0` disables
    pub days: i64,
    /// Hours between sweeps
    pub interval_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            auto_cleanup: false,
            days: 7,
            interval_hours: 24,
        }
    }
}

impl RetentionConfig {
    /// Whether the sweep should run at all.
    pub fn is_active(&self) -> bool {
        self.auto_cleanup && self.days > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstantReplayConfig {
    /// Enable instant replays
    pub enabled: bool,
    /// Output directory
    pub dir: PathBuf,
    /// Length of the replay window in minutes
    pub replay_minutes: u32,
    /// Instant replays older than this are swept
    pub expire_minutes: u32,
}

impl Default for InstantReplayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("replay/instant"),
            replay_minutes: 5,
            expire_minutes: 5,
        }
    }
}

/// What happens to a session whose subject disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfflinePolicy {
    /// Keep the session open and buffering
    Keep,
    /// Stop and seal the session
    #[default]
    Stop,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Behaviour when a recorded subject goes offline
    pub on_subject_offline: OfflinePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Deliver start/stop notifications to the host
    pub enabled: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Validation result with multiple issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation issues
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Create a new empty validation result.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Check if validation passed (no errors).
    pub fn is_ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }

    /// Get only error-level issues.
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
            .collect()
    }

    /// Get only warning-level issues.
    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
            .collect()
    }

    /// Add an error.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning.
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            field: field.into(),
            message: message.into(),
        });
    }
}

/// A single validation issue.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity of the issue
    pub severity: IssueSeverity,
    /// Field path (e.g., "retention.days")
    pub field: String,
    /// Human-readable message
    pub message: String,
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Warnings don't prevent loading
    Warning,
    /// Errors prevent loading
    Error,
}

impl Config {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// The layered configuration sources, lowest precedence first.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file(Self::config_dir().join("config.toml")))
            .merge(Toml::file("reelhouse.toml"))
            .merge(Env::prefixed("REELHOUSE_").split("__"))
    }

    /// Load and validate configuration.
    pub fn load_validated() -> Result<Self, Error> {
        let config = Self::load().map_err(|e| Error::Config(e.to_string()))?;
        config.into_validated()
    }

    /// Validate an already-built configuration, logging warnings.
    pub fn into_validated(self) -> Result<Self, Error> {
        let result = self.validate();

        if !result.is_ok() {
            let errors: Vec<String> = result
                .errors()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.warnings() {
            tracing::warn!("Config warning - {}: {}", warning.field, warning.message);
        }

        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.recording.root.as_os_str().is_empty() {
            result.add_error("recording.root", "Recording root cannot be empty");
        }

        let ext = &self.recording.extension;
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            result.add_error(
                "recording.extension",
                format!("Invalid extension '{}': use letters and digits only", ext),
            );
        }

        if self.recording.custom_label_min == 0 {
            result.add_error("recording.custom_label_min", "custom_label_min must be greater than 0");
        }

        if self.recording.custom_label_min > self.recording.custom_label_max {
            result.add_error(
                "recording.custom_label_max",
                "custom_label_max must not be smaller than custom_label_min",
            );
        }

        if self.retention.auto_cleanup && self.retention.days <= 0 {
            result.add_warning(
                "retention.days",
                "auto_cleanup is enabled but days <= 0 disables the sweep",
            );
        }

        if self.retention.interval_hours == 0 {
            result.add_error("retention.interval_hours", "interval_hours must be greater than 0");
        }

        if self.instant_replay.enabled {
            if self.instant_replay.replay_minutes == 0 {
                result.add_error(
                    "instant_replay.replay_minutes",
                    "replay_minutes must be greater than 0",
                );
            }
            if self.instant_replay.dir == self.recording.root {
                result.add_error(
                    "instant_replay.dir",
                    "instant replay directory must differ from the recording root",
                );
            }
        }

        if self.filter.mode == RecordMode::Whitelist && self.filter.whitelist.is_empty() {
            result.add_warning(
                "filter.whitelist",
                "whitelist mode with an empty whitelist records every subject",
            );
        }

        result
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("reelhouse"))
            .unwrap_or_else(|| PathBuf::from("~/.config/reelhouse"))
    }
}
