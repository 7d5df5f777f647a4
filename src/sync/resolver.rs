//! Action Resolver: turns a configured action plus an event into concrete
//! lookup and update requests.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};

use crate::domain::{
    ApprovalEvent, FailureKind, FieldAssignment, LookupSource, RecordLookupRequest, ScalarValue, SyncAction,
    UpdateSource,
};

/// Source of "now" for `timestamp` updates
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock in local time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

/// An action ready for the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAction {
    pub lookup: RecordLookupRequest,
    /// In configured order; may be empty
    pub assignments: Vec<FieldAssignment>,
}

/// Resolve the lookup and every update of `action` against `event`.
///
/// Any `form_field` reference absent from the event fails the whole action
/// before a gateway call is made. Timestamps are taken from `clock` when
/// this runs, so two actions of the same event may carry different times.
pub fn resolve_action(
    action: &SyncAction,
    event: &ApprovalEvent,
    clock: &dyn Clock,
    timestamp_format: &str,
) -> Result<ResolvedAction, FailureKind> {
    let expected_value = match &action.find_by.source {
        LookupSource::FormField(key) => form_value(event, key)?,
        LookupSource::Literal(value) => value.clone(),
    };

    let assignments = action
        .updates
        .iter()
        .map(|update| {
            let value = match &update.source {
                UpdateSource::FormField(key) => form_value(event, key)?,
                UpdateSource::Literal(value) => value.clone(),
                UpdateSource::Timestamp => ScalarValue::Text(render_timestamp(clock.now(), timestamp_format)?),
            };
            Ok(FieldAssignment {
                field_name: update.target_field_name.clone(),
                value,
            })
        })
        .collect::<Result<Vec<_>, FailureKind>>()?;

    Ok(ResolvedAction {
        lookup: RecordLookupRequest {
            target: action.target.clone(),
            field_name: action.find_by.target_field_name.clone(),
            expected_value,
        },
        assignments,
    })
}

/// Whether every specifier in `format` is known to chrono
pub fn is_valid_timestamp_format(format: &str) -> bool {
    StrftimeItems::new(format).all(|item| !matches!(item, Item::Error))
}

fn render_timestamp(now: DateTime<Local>, format: &str) -> Result<String, FailureKind> {
    let mut rendered = String::new();
    write!(rendered, "{}", now.format(format)).map_err(|_| FailureKind::InvalidTimestampFormat {
        format: format.to_string(),
    })?;
    Ok(rendered)
}

fn form_value(event: &ApprovalEvent, key: &str) -> Result<ScalarValue, FailureKind> {
    event
        .form_field(key)
        .cloned()
        .ok_or_else(|| FailureKind::MissingFormField { key: key.to_string() })
}
