//! Application configuration document.
//!
//! Loaded from an explicit path, ./approval-sync.yml, or
//! ~/.config/approval-sync/approval-sync.yml. `${VAR}` placeholders are
//! substituted from the environment before parsing.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::approvals::ApprovalConfig;
use super::env::substitute_env_vars;
use crate::gateway::{AmbiguityPolicy, RetryPolicy};
use crate::sync::is_valid_timestamp_format;

/// File name searched for in the working and config directories
pub const CONFIG_FILE_NAME: &str = "approval-sync.yml";

/// Top-level configuration for approval-sync.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// DingTalk application credentials and endpoints.
    pub dingtalk: DingTalkConfig,

    /// Notable (AI table) defaults.
    pub spreadsheet: SpreadsheetConfig,

    /// Approval templates and the actions they trigger.
    pub approvals: Vec<ApprovalConfig>,

    /// Retry budget for table store calls.
    pub execution: RetryPolicy,

    /// Redelivery absorption.
    pub dedup: DedupConfig,

    /// Log level and destination.
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Resolve which file to load.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. ./approval-sync.yml
    /// 3. ~/.config/approval-sync/approval-sync.yml
    pub fn locate(config_path: Option<&PathBuf>) -> Result<PathBuf> {
        if let Some(path) = config_path {
            return Ok(path.clone());
        }

        let project_config = PathBuf::from(CONFIG_FILE_NAME);
        if project_config.exists() {
            return Ok(project_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(env!("CARGO_PKG_NAME")).join(CONFIG_FILE_NAME);
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        eyre::bail!(
            "No config file found; pass --config or create ./{} (credentials have no defaults)",
            CONFIG_FILE_NAME
        )
    }

    /// Locate, load and validate the configuration
    pub fn load(config_path: Option<&PathBuf>) -> Result<(Self, PathBuf)> {
        let path = Self::locate(config_path)?;
        let config =
            Self::load_from_file(&path).with_context(|| format!("Failed to load config from {}", path.display()))?;
        Ok((config, path))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config = Self::from_yaml(&content)?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse a YAML document after environment substitution, then validate it
    pub fn from_yaml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content, |name| std::env::var(name).ok());
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.dingtalk.app_key.trim().is_empty() {
            eyre::bail!("dingtalk.app_key must be set");
        }
        if self.dingtalk.app_secret.trim().is_empty() {
            eyre::bail!("dingtalk.app_secret must be set");
        }
        if self.spreadsheet.page_size == 0 || self.spreadsheet.page_size > 100 {
            eyre::bail!("spreadsheet.page_size must be between 1 and 100");
        }
        if !is_valid_timestamp_format(&self.spreadsheet.timestamp_format) {
            eyre::bail!(
                "spreadsheet.timestamp_format has an unknown specifier: {}",
                self.spreadsheet.timestamp_format
            );
        }
        if self.dedup.capacity == 0 {
            eyre::bail!("dedup.capacity must be > 0");
        }
        if self.execution.backoff_multiplier < 1.0 {
            eyre::bail!("execution.backoff_multiplier must be >= 1.0");
        }
        for (index, approval) in self.approvals.iter().enumerate() {
            approval
                .to_rule(&self.spreadsheet)
                .map_err(|e| eyre::eyre!("approvals[{}] ({}): {}", index, approval.name, e))?;
        }
        Ok(())
    }

    /// Number of approval rules that are switched on
    pub fn enabled_approvals(&self) -> usize {
        self.approvals.iter().filter(|a| a.enabled).count()
    }
}

/// DingTalk application settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DingTalkConfig {
    pub app_key: String,
    pub app_secret: String,

    /// Base URL of the v1.0 open API.
    pub api_base_url: String,

    /// Base URL of the legacy `oapi` endpoints (failed-event feed).
    pub oapi_base_url: String,

    /// HTTP timeout per request in milliseconds.
    pub timeout_ms: u64,
}

impl Default for DingTalkConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            app_secret: String::new(),
            api_base_url: "https://api.dingtalk.com".to_string(),
            oapi_base_url: "https://oapi.dingtalk.com".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Notable defaults shared by all actions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpreadsheetConfig {
    /// Base used when an action names none.
    pub base_id: Option<String>,

    /// Sheet used when an action names none.
    pub default_sheet_id: Option<String>,

    /// Operator used when the event carries no identity.
    pub default_operator_id: Option<String>,

    /// chrono format for `timestamp` updates (local time).
    pub timestamp_format: String,

    /// Records requested per lookup page (1..=100).
    pub page_size: u32,

    /// Behavior when a lookup matches several records.
    pub on_ambiguous: AmbiguityPolicy,
}

impl Default for SpreadsheetConfig {
    fn default() -> Self {
        Self {
            base_id: None,
            default_sheet_id: None,
            default_operator_id: None,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            page_size: 100,
            on_ambiguous: AmbiguityPolicy::FirstMatch,
        }
    }
}

/// Deduplication of redelivered events.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Number of recent instance ids remembered.
    pub capacity: usize,

    /// Forget ids older than this many seconds (none = only capacity bounds it).
    pub ttl_secs: Option<u64>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            ttl_secs: Some(24 * 60 * 60),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set.
    pub level: String,

    /// Log file; `-` logs to stderr. Defaults to the platform data dir.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
dingtalk:
  app_key: key
  app_secret: secret
"#;

    const FULL: &str = r#"
dingtalk:
  app_key: key
  app_secret: secret
spreadsheet:
  base_id: base1
  default_sheet_id: sheet1
  default_operator_id: op-default
  on_ambiguous: error
approvals:
  - name: 请假审批
    template_id: proc_leave_approval
    actions:
      - type: update_spreadsheet
        find_by:
          field_name: 员工工号
          form_field: employee_id
        updates:
          - field_name: 请假天数
            form_field: leave_days
          - field_name: 审批状态
            value: 已审批
          - field_name: 审批时间
            timestamp: true
  - name: 出差审批
    template_id: proc_trip
    enabled: false
execution:
  max_retries: 5
  initial_backoff_ms: 100
"#;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.dingtalk.api_base_url, "https://api.dingtalk.com");
        assert_eq!(config.spreadsheet.page_size, 100);
        assert_eq!(config.execution.max_retries, 3);
        assert_eq!(config.dedup.capacity, 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_default_config_needs_credentials() {
        assert!(AppConfig::default().validate().is_err());
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.dingtalk.app_key, "key");
        assert!(config.approvals.is_empty());
        assert_eq!(config.spreadsheet.on_ambiguous, AmbiguityPolicy::FirstMatch);
    }

    #[test]
    fn test_parse_full_yaml() {
        let config = AppConfig::from_yaml(FULL).unwrap();
        assert_eq!(config.approvals.len(), 2);
        assert_eq!(config.enabled_approvals(), 1);
        assert_eq!(config.approvals[0].actions[0].updates.len(), 3);
        assert_eq!(config.spreadsheet.on_ambiguous, AmbiguityPolicy::Error);
        assert_eq!(config.execution.max_retries, 5);
        assert_eq!(config.execution.initial_backoff_ms, 100);
        // Unset retry fields keep defaults
        assert_eq!(config.execution.max_backoff_ms, 30_000);
    }

    #[test]
    fn test_invalid_page_size() {
        let mut config = AppConfig::from_yaml(MINIMAL).unwrap();
        config.spreadsheet.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_action_is_reported_with_index() {
        let yaml = r#"
dingtalk:
  app_key: key
  app_secret: secret
approvals:
  - name: broken
    template_id: proc
    actions:
      - base_id: b
        sheet_id: s
        find_by:
          field_name: 工号
          form_field: id
        updates:
          - field_name: 状态
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("approvals[0] (broken)"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.approvals[0].template_id, "proc_leave_approval");
    }

    #[test]
    fn test_unknown_timestamp_specifier_rejected() {
        let yaml = format!("{}spreadsheet:\n  timestamp_format: \"%Y %Q\"\n", MINIMAL);
        let err = AppConfig::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("timestamp_format"));
    }

    #[test]
    fn test_example_config_parses() {
        let config = AppConfig::from_yaml(include_str!("../../approval-sync.example.yml")).unwrap();
        assert_eq!(config.approvals.len(), 2);
        assert_eq!(config.enabled_approvals(), 1);
        assert_eq!(config.approvals[1].actions[0].sheet_id.as_deref(), Some("sheet-trips"));
    }

    #[test]
    fn test_load_explicit_missing_path() {
        let path = PathBuf::from("/nonexistent/approval-sync.yml");
        assert!(AppConfig::load(Some(&path)).is_err());
    }
}
