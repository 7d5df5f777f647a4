//! Configuration system for approval-sync.
//!
//! - `AppConfig`: the YAML document (credentials, defaults, approvals, retry)
//! - `ConfigSnapshot`: the validated, immutable view events are processed against
//! - `ConfigWatcher`: reloads the file and publishes new snapshots

use std::path::PathBuf;

use eyre::Result;

pub use self::app::{AppConfig, CONFIG_FILE_NAME, DedupConfig, DingTalkConfig, LoggingConfig, SpreadsheetConfig};
pub use self::approvals::{ActionConfig, ApprovalConfig, FindByConfig, UPDATE_SPREADSHEET, UpdateFieldConfig};
pub use self::env::substitute_env_vars;
pub use self::snapshot::{ConfigSnapshot, SnapshotHandle};
pub use self::watcher::{ConfigWatcher, reload_into};

mod app;
mod approvals;
mod env;
mod snapshot;
mod watcher;

/// Load configuration from the standard search paths.
///
/// Search order:
/// 1. Explicit path if provided
/// 2. ./approval-sync.yml in current directory
/// 3. ~/.config/approval-sync/approval-sync.yml
///
/// Returns the path it was loaded from so it can be watched.
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<(AppConfig, PathBuf)> {
    AppConfig::load(explicit_path)
}
