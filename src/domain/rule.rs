//! Sync rules and the resolved requests they produce.
//!
//! Rules here are the validated form: every action has a concrete target and
//! every update has exactly one value source. The YAML shape lives in
//! `config::approvals` and converts into these types when a snapshot is built.

use std::fmt;

use super::value::ScalarValue;

/// Destination sheet inside a Notable base
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableTarget {
    pub base_id: String,
    pub sheet_id: String,
}

impl TableTarget {
    pub fn new(base_id: impl Into<String>, sheet_id: impl Into<String>) -> Self {
        Self {
            base_id: base_id.into(),
            sheet_id: sheet_id.into(),
        }
    }
}

impl fmt::Display for TableTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base_id, self.sheet_id)
    }
}

/// Identifier of a record (row) in the store
pub type RecordId = String;

/// An approval template bound to the actions it triggers
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRule {
    pub name: String,
    pub template_id: String,
    pub enabled: bool,
    pub actions: Vec<SyncAction>,
}

/// One lookup + update unit
#[derive(Debug, Clone, PartialEq)]
pub struct SyncAction {
    pub target: TableTarget,
    pub find_by: LookupSpec,
    pub updates: Vec<FieldUpdateSpec>,
}

/// Where a lookup value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum LookupSource {
    FormField(String),
    Literal(ScalarValue),
}

/// How to find the record an action updates
#[derive(Debug, Clone, PartialEq)]
pub struct LookupSpec {
    /// Destination field matched against
    pub target_field_name: String,
    pub source: LookupSource,
}

/// Where an updated value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateSource {
    FormField(String),
    Literal(ScalarValue),
    /// Current time at resolution
    Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdateSpec {
    pub target_field_name: String,
    pub source: UpdateSource,
}

/// A lookup ready to hand to the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLookupRequest {
    pub target: TableTarget,
    pub field_name: String,
    pub expected_value: ScalarValue,
}

/// A resolved field value ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAssignment {
    pub field_name: String,
    pub value: ScalarValue,
}

impl FieldAssignment {
    pub fn new(field_name: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self {
            field_name: field_name.into(),
            value: value.into(),
        }
    }
}

/// Build the field map of a batched update; later assignments to the same
/// field overwrite earlier ones.
pub fn assignments_to_fields(assignments: &[FieldAssignment]) -> serde_json::Map<String, serde_json::Value> {
    assignments
        .iter()
        .map(|a| (a.field_name.clone(), a.value.to_json()))
        .collect()
}
