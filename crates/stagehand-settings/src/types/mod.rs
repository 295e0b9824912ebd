//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file only needs the keys it changes.

mod server;

pub use server::*;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stagehand_core::logging::is_valid_level;
use stagehand_core::stages::StagePlan;

use crate::errors::{Result, SettingsError};

/// Root settings type for the worker.
///
/// # JSON Format
///
/// ```json
/// {
///   "server": { "port": 9850 },
///   "connection": { "inboundCapacity": 4 },
///   "rules": { "targets": { "cpp": [{"name": "compile"}, {"name": "run"}] } }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerSettings {
    /// Worker name, used in logs.
    pub name: String,
    /// Listener settings.
    pub server: ServerSettings,
    /// Per-connection queue settings.
    pub connection: ConnectionSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Target → stage plan rules.
    pub rules: RuleSettings,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            name: "stagehand".to_string(),
            server: ServerSettings::default(),
            connection: ConnectionSettings::default(),
            logging: LoggingSettings::default(),
            rules: RuleSettings::default(),
        }
    }
}

impl WorkerSettings {
    /// Reject values the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("server.host must not be empty".into()));
        }
        if self.connection.inbound_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.inboundCapacity must be at least 1".into(),
            ));
        }
        if self.connection.outbound_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.outboundCapacity must be at least 1".into(),
            ));
        }
        if !is_valid_level(&self.logging.level) {
            return Err(SettingsError::InvalidValue(format!(
                "unknown logging.level '{}'",
                self.logging.level
            )));
        }
        if self.rules.targets.keys().any(String::is_empty) {
            return Err(SettingsError::InvalidValue(
                "rules.targets contains an empty target name".into(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Stage plan rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleSettings {
    /// Optional standalone rule file; replaces `targets` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Inline target → plan table.
    pub targets: BTreeMap<String, StagePlan>,
}

impl Default for RuleSettings {
    fn default() -> Self {
        let mut targets = BTreeMap::new();
        let _ = targets.insert("cpp".to_string(), StagePlan::from_names(["compile", "run"]));
        Self {
            path: None,
            targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_are_valid() {
        let settings = WorkerSettings::default();
        assert_eq!(settings.name, "stagehand");
        assert_eq!(settings.logging.level, "info");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn default_rules_include_cpp() {
        let rules = RuleSettings::default();
        assert_eq!(rules.targets["cpp"].names(), vec!["compile", "run"]);
        assert!(rules.path.is_none());
    }

    #[test]
    fn zero_inbound_capacity_invalid() {
        let mut settings = WorkerSettings::default();
        settings.connection.inbound_capacity = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("inboundCapacity"));
    }

    #[test]
    fn zero_outbound_capacity_invalid() {
        let mut settings = WorkerSettings::default();
        settings.connection.outbound_capacity = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn blank_host_invalid() {
        let mut settings = WorkerSettings::default();
        settings.server.host = "  ".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unknown_log_level_invalid() {
        let mut settings = WorkerSettings::default();
        settings.logging.level = "verbose".into();
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("verbose"));
    }

    #[test]
    fn empty_rule_target_invalid() {
        let mut settings = WorkerSettings::default();
        let _ = settings
            .rules
            .targets
            .insert(String::new(), StagePlan::from_names(["run"]));
        assert!(settings.validate().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let settings = WorkerSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: WorkerSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}
