//! Domain types for approval-sync
//!
//! This module contains all core domain types:
//! - ScalarValue: closed string/number/boolean variant for form and cell values
//! - RawEvent / ApprovalEvent: vendor payload and its normalized form
//! - ApprovalRule / SyncAction: validated sync rules and the requests they resolve to
//! - SyncOutcome / EventReport: per-action and per-event results

pub mod event;
pub mod outcome;
pub mod rule;
pub mod value;

pub use event::{ApprovalEvent, ApprovalResult, RawEvent, event_types};
pub use outcome::{ActionReport, DiscardReason, Disposition, EventReport, FailureKind, SkipReason, SyncOutcome};
pub use rule::{
    ApprovalRule, FieldAssignment, FieldUpdateSpec, LookupSource, LookupSpec, RecordId, RecordLookupRequest,
    SyncAction, TableTarget, UpdateSource, assignments_to_fields,
};
pub use value::ScalarValue;
