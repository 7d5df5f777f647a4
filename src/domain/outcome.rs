//! Outcome types for event and action processing.

use std::fmt;

use super::event::ApprovalResult;
use super::rule::{RecordId, TableTarget};

/// Terminal result of one sync action
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Record found and the batched update accepted
    Applied { record_id: RecordId, updated_fields: usize },
    /// Nothing to write
    Skipped(SkipReason),
    /// Action could not complete
    Failed(FailureKind),
}

impl SyncOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Lookup returned no record
    NoMatchingRecord,
    /// Record found but the action has no field updates
    NoFieldUpdates { record_id: RecordId },
}

/// Action-scoped failure kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// A configured form field is absent from the event
    MissingFormField { key: String },
    /// Transient store failure that outlived the retry budget
    TransientGateway { attempts: u32, message: String },
    /// Non-retryable store failure (auth, malformed request, record gone)
    FatalGateway { message: String },
    /// More than one record matched and the policy forbids picking one
    AmbiguousLookup { matches: usize },
    /// The configured timestamp format could not be rendered
    InvalidTimestampFormat { format: String },
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFormField { key } => write!(f, "missing form field '{}'", key),
            Self::TransientGateway { attempts, message } => {
                write!(f, "transient gateway error after {} attempts: {}", attempts, message)
            }
            Self::FatalGateway { message } => write!(f, "fatal gateway error: {}", message),
            Self::AmbiguousLookup { matches } => write!(f, "lookup matched {} records", matches),
            Self::InvalidTimestampFormat { format } => write!(f, "invalid timestamp format '{}'", format),
        }
    }
}

/// Outcome of one action together with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    pub rule_name: String,
    /// Position of the action within its rule
    pub action_index: usize,
    pub target: TableTarget,
    pub outcome: SyncOutcome,
}

/// Why an event was dropped before any rule was considered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    UnsupportedEventType(String),
    MissingField(&'static str),
    MissingOperator,
    MalformedPayload(String),
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedEventType(t) => write!(f, "unsupported event type '{}'", t),
            Self::MissingField(name) => write!(f, "missing field '{}'", name),
            Self::MissingOperator => write!(f, "no operator identity"),
            Self::MalformedPayload(msg) => write!(f, "malformed payload: {}", msg),
        }
    }
}

/// What happened to an event as a whole
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Discarded(DiscardReason),
    NotAgreed(ApprovalResult),
    Duplicate,
    NoMatchingRule,
    Processed(Vec<ActionReport>),
}

/// Structured report for one handled event
#[derive(Debug, Clone, PartialEq)]
pub struct EventReport {
    pub instance_id: Option<String>,
    pub template_id: Option<String>,
    pub disposition: Disposition,
}

impl EventReport {
    pub fn discarded(reason: DiscardReason) -> Self {
        Self {
            instance_id: None,
            template_id: None,
            disposition: Disposition::Discarded(reason),
        }
    }

    /// Action reports, empty unless the event was processed
    pub fn actions(&self) -> &[ActionReport] {
        match &self.disposition {
            Disposition::Processed(reports) => reports,
            _ => &[],
        }
    }

    pub fn applied_count(&self) -> usize {
        self.actions().iter().filter(|r| r.outcome.is_applied()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.actions().iter().filter(|r| r.outcome.is_skipped()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.actions().iter().filter(|r| r.outcome.is_failed()).count()
    }

    /// Whether any action failed in a way a redelivery could fix
    pub fn has_retryable_failure(&self) -> bool {
        self.actions()
            .iter()
            .any(|r| matches!(r.outcome, SyncOutcome::Failed(FailureKind::TransientGateway { .. })))
    }
}
