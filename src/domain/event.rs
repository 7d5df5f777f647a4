//! Approval events: the raw vendor payload and its normalized form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::value::ScalarValue;

/// Event type constants from the DingTalk event catalogue
pub mod event_types {
    pub const TASK_CHANGE: &str = "bpms_task_change";
    pub const INSTANCE_CHANGE: &str = "bpms_instance_change";

    /// Event types carrying approval lifecycle changes
    pub const APPROVAL: [&str; 2] = [TASK_CHANGE, INSTANCE_CHANGE];
}

/// Raw event as handed over by a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Vendor event type, e.g. `bpms_instance_change`
    pub event_type: String,
    /// Delivery/message id if the transport provides one
    pub event_id: Option<String>,
    /// Event body
    pub data: Value,
}

impl RawEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            event_id: None,
            data,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Whether this is an approval lifecycle event
    pub fn is_approval(&self) -> bool {
        event_types::APPROVAL.contains(&self.event_type.as_str())
    }
}

/// Result carried by an approval event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalResult {
    Agreed,
    Refused,
    /// Anything else, including a missing result (e.g. instance start)
    Other(String),
}

impl ApprovalResult {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("agree") => Self::Agreed,
            Some("refuse") => Self::Refused,
            Some(other) => Self::Other(other.to_string()),
            None => Self::Other(String::new()),
        }
    }

    pub fn is_agreed(&self) -> bool {
        matches!(self, Self::Agreed)
    }
}

/// Canonical approval event, immutable once built by the normalizer
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalEvent {
    /// Approval template (process code)
    pub template_id: String,
    pub result: ApprovalResult,
    /// Identity the table store API acts as
    pub operator_id: String,
    pub form_fields: BTreeMap<String, ScalarValue>,
    /// Approval instance id, used for deduplication
    pub instance_id: String,
}

impl ApprovalEvent {
    /// Look up a form field by key
    pub fn form_field(&self, key: &str) -> Option<&ScalarValue> {
        self.form_fields.get(key)
    }
}
