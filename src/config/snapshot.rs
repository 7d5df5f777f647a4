//! Immutable configuration snapshots and their publication.
//!
//! Every event captures one `Arc<ConfigSnapshot>` at dispatch and uses it to
//! the end. A reload builds a complete new snapshot and swaps it in through a
//! `tokio::sync::watch` channel; events already in flight keep the old one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use super::app::AppConfig;
use crate::domain::ApprovalRule;
use crate::error::{Result, SyncError};
use crate::gateway::GatewaySettings;

/// Everything one event needs from configuration
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// Rules in configured order
    pub rules: Vec<ApprovalRule>,
    pub default_operator_id: Option<String>,
    pub timestamp_format: String,
    pub gateway: GatewaySettings,
    /// Monotonic counter; 1 for the first snapshot of a process
    pub version: u64,
}

impl ConfigSnapshot {
    /// Build a snapshot, validating every approval rule
    pub fn from_config(config: &AppConfig, version: u64) -> Result<Self> {
        let rules = config
            .approvals
            .iter()
            .enumerate()
            .map(|(index, approval)| {
                approval.to_rule(&config.spreadsheet).map_err(|e| {
                    SyncError::Config(format!("approvals[{}] ({}): {}", index, approval.name, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let default_operator_id = config
            .spreadsheet
            .default_operator_id
            .clone()
            .filter(|id| !id.trim().is_empty());

        Ok(Self {
            rules,
            default_operator_id,
            timestamp_format: config.spreadsheet.timestamp_format.clone(),
            gateway: GatewaySettings {
                retry: config.execution.clone(),
                page_size: config.spreadsheet.page_size,
                on_ambiguous: config.spreadsheet.on_ambiguous,
            },
            version,
        })
    }

    /// Snapshot with only the given rules and default settings
    pub fn with_rules(rules: Vec<ApprovalRule>) -> Self {
        Self {
            rules,
            default_operator_id: None,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            gateway: GatewaySettings::default(),
            version: 1,
        }
    }

    pub fn enabled_rules(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }
}

/// Shared handle to the active snapshot
#[derive(Clone)]
pub struct SnapshotHandle {
    sender: Arc<watch::Sender<Arc<ConfigSnapshot>>>,
    versions: Arc<AtomicU64>,
}

impl SnapshotHandle {
    pub fn new(initial: ConfigSnapshot) -> Self {
        let versions = Arc::new(AtomicU64::new(initial.version));
        let (sender, _) = watch::channel(Arc::new(initial));
        Self {
            sender: Arc::new(sender),
            versions,
        }
    }

    /// The snapshot active right now
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.sender.borrow().clone()
    }

    /// Version number to give the next snapshot
    pub fn next_version(&self) -> u64 {
        self.versions.load(Ordering::SeqCst) + 1
    }

    /// Replace the active snapshot; readers holding the old one are unaffected
    pub fn publish(&self, mut snapshot: ConfigSnapshot) -> Arc<ConfigSnapshot> {
        snapshot.version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(snapshot);
        self.sender.send_replace(snapshot.clone());
        log::info!(
            "Published config snapshot v{} ({} rules, {} enabled)",
            snapshot.version,
            snapshot.rules.len(),
            snapshot.enabled_rules()
        );
        snapshot
    }

    /// Receiver that wakes on every publish
    pub fn subscribe(&self) -> watch::Receiver<Arc<ConfigSnapshot>> {
        self.sender.subscribe()
    }
}
