//! Rule Matcher: which enabled rules apply to an event.

use crate::domain::{ApprovalEvent, ApprovalRule};

/// Enabled rules whose template id equals the event's, in configured order.
///
/// Comparison is exact and case-sensitive.
pub fn match_rules<'a>(event: &ApprovalEvent, rules: &'a [ApprovalRule]) -> Vec<&'a ApprovalRule> {
    rules
        .iter()
        .filter(|rule| rule.enabled && rule.template_id == event.template_id)
        .collect()
}
