//! Hot reload of the config file.
//!
//! The parent directory is watched so editors that save by rename are seen.
//! A change reloads and validates the whole file; only a valid file is
//! published, otherwise the active snapshot stays in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::app::AppConfig;
use super::snapshot::{ConfigSnapshot, SnapshotHandle};
use crate::error::{Result, SyncError};

/// Quiet period collapsing the burst of events one save produces
const DEBOUNCE: Duration = Duration::from_millis(250);

/// Reload `path` and publish it. The active snapshot is kept on any error.
pub fn reload_into(path: &Path, handle: &SnapshotHandle) -> Result<Arc<ConfigSnapshot>> {
    let config = AppConfig::load_from_file(path).map_err(|e| SyncError::Config(format!("{:#}", e)))?;
    let snapshot = ConfigSnapshot::from_config(&config, handle.next_version())?;
    Ok(handle.publish(snapshot))
}

/// Watches the config file for as long as it is alive
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ConfigWatcher {
    /// Start watching `path`, publishing into `handle` on every valid change
    pub fn spawn(path: PathBuf, handle: SnapshotHandle) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| SyncError::Watch(format!("not a file path: {}", path.display())))?;
        let watch_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| match event {
            Ok(event) => {
                let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    && event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str()));
                if relevant {
                    let _ = tx.send(());
                }
            }
            Err(e) => log::warn!("Config watch error: {}", e),
        })
        .map_err(|e| SyncError::Watch(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| SyncError::Watch(format!("Failed to watch {}: {}", watch_dir.display(), e)))?;
        log::info!("Watching {} for config changes", path.display());

        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                tokio::time::sleep(DEBOUNCE).await;
                while rx.try_recv().is_ok() {}

                match reload_into(&path, &handle) {
                    Ok(snapshot) => log::info!("Config reloaded from {} (v{})", path.display(), snapshot.version),
                    Err(e) => log::error!("Config reload rejected, keeping current snapshot: {}", e),
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const VALID: &str = r#"
dingtalk:
  app_key: key
  app_secret: secret
spreadsheet:
  base_id: base1
  default_sheet_id: sheet1
approvals:
  - name: 请假审批
    template_id: proc_leave
    actions:
      - find_by:
          field_name: 员工工号
          form_field: employee_id
"#;

    #[test]
    fn test_reload_publishes_new_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("approval-sync.yml");
        fs::write(&path, VALID).unwrap();

        let handle = SnapshotHandle::new(ConfigSnapshot::with_rules(vec![]));
        let snapshot = reload_into(&path, &handle).unwrap();

        assert_eq!(snapshot.version, 2);
        assert_eq!(handle.current().rules[0].template_id, "proc_leave");
    }

    #[test]
    fn test_invalid_reload_keeps_current() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("approval-sync.yml");
        fs::write(&path, "dingtalk:\n  app_key: ''\n").unwrap();

        let handle = SnapshotHandle::new(ConfigSnapshot::with_rules(vec![]));
        assert!(reload_into(&path, &handle).is_err());
        assert_eq!(handle.current().version, 1);
    }

    #[tokio::test]
    async fn test_spawn_on_missing_directory_fails() {
        let handle = SnapshotHandle::new(ConfigSnapshot::with_rules(vec![]));
        let result = ConfigWatcher::spawn(PathBuf::from("/nonexistent/dir/approval-sync.yml"), handle);
        assert!(matches!(result, Err(SyncError::Watch(_))));
    }
}
