//! Error types for approval-sync
//!
//! Centralized error handling using thiserror. Action-scoped failures are not
//! errors at this level: they become `SyncOutcome::Failed` and never abort an
//! event. `SyncError` covers the surrounding machinery (config, transport, IO).

use thiserror::Error;

use crate::gateway::GatewayError;

/// All error types that can occur outside a single sync action
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration could not be loaded or failed validation
    #[error("Config error: {0}")]
    Config(String),

    /// Call against a DingTalk API failed
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Event transport failed to deliver or acknowledge
    #[error("Transport error: {0}")]
    Transport(String),

    /// File watcher could not be set up
    #[error("Watch error: {0}")]
    Watch(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for approval-sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
