//! Sync orchestrator - drives one event through the whole pipeline.
//!
//! For each event:
//! 1. Capture the active config snapshot (used to the end, even across a reload)
//! 2. Normalize; discard what cannot be acted on
//! 3. Stop unless the approval was agreed
//! 4. Match rules; claim the instance id for deduplication
//! 5. Enrich form fields from the instance details when a source is set
//! 6. Resolve and run every action of every matched rule concurrently
//!
//! Action failures are recorded in the report and never abort siblings.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;

use super::dedup::RecentEvents;
use super::enrich::{FormDetailSource, merge_detail};
use super::matcher::match_rules;
use super::normalizer::{normalize, payload_object};
use super::resolver::{Clock, SystemClock, resolve_action};
use crate::config::{ConfigSnapshot, SnapshotHandle};
use crate::domain::{
    ActionReport, ApprovalEvent, ApprovalRule, Disposition, EventReport, FailureKind, RawEvent, SkipReason,
    SyncAction, SyncOutcome, assignments_to_fields,
};
use crate::gateway::{GatewayFailure, LookupResult, TableGateway, TableStore};

/// Runs events against the active configuration and a table store.
pub struct SyncOrchestrator<S: TableStore> {
    gateway: TableGateway<S>,
    snapshots: SnapshotHandle,
    recent: RecentEvents,
    clock: Arc<dyn Clock>,
    forms: Option<Arc<dyn FormDetailSource>>,
}

impl<S: TableStore> SyncOrchestrator<S> {
    pub fn new(store: Arc<S>, snapshots: SnapshotHandle, recent: RecentEvents) -> Self {
        Self {
            gateway: TableGateway::new(store),
            snapshots,
            recent,
            clock: Arc::new(SystemClock),
            forms: None,
        }
    }

    /// Use a different clock for `timestamp` updates
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fetch instance details for matched events
    pub fn with_form_source(mut self, forms: Arc<dyn FormDetailSource>) -> Self {
        self.forms = Some(forms);
        self
    }

    pub fn snapshots(&self) -> &SnapshotHandle {
        &self.snapshots
    }

    /// Handle one event against the snapshot active right now
    pub async fn handle(&self, raw: &RawEvent) -> EventReport {
        let snapshot = self.snapshots.current();
        self.handle_with(raw, &snapshot).await
    }

    /// Handle one event against a given snapshot
    pub async fn handle_with(&self, raw: &RawEvent, snapshot: &ConfigSnapshot) -> EventReport {
        let event = match normalize(raw, snapshot.default_operator_id.as_deref()) {
            Ok(event) => event,
            Err(reason) => {
                log::info!("Discarded {} event: {}", raw.event_type, reason);
                return EventReport::discarded(reason);
            }
        };

        let report = |disposition| EventReport {
            instance_id: Some(event.instance_id.clone()),
            template_id: Some(event.template_id.clone()),
            disposition,
        };

        if !event.result.is_agreed() {
            log::info!(
                "Approval {} ({}) not agreed ({:?}), nothing to sync",
                event.instance_id,
                event.template_id,
                event.result
            );
            return report(Disposition::NotAgreed(event.result.clone()));
        }

        let rules = match_rules(&event, &snapshot.rules);
        if rules.is_empty() {
            log::info!("No rule for template {} (instance {})", event.template_id, event.instance_id);
            return report(Disposition::NoMatchingRule);
        }

        if !self.recent.claim(&event.instance_id) {
            log::info!("Approval {} already handled, skipping redelivery", event.instance_id);
            return report(Disposition::Duplicate);
        }

        let event = self.enrich(raw, event, snapshot).await;
        let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        log::info!(
            "Approval {} ({}) agreed by {}; rules: {:?} (config v{})",
            event.instance_id,
            event.template_id,
            event.operator_id,
            names,
            snapshot.version
        );

        let reports = self.run_rules(&rules, &event, snapshot).await;
        let report = EventReport {
            instance_id: Some(event.instance_id.clone()),
            template_id: Some(event.template_id.clone()),
            disposition: Disposition::Processed(reports),
        };

        if report.has_retryable_failure() {
            self.recent.release(&event.instance_id);
        }
        log::info!(
            "Approval {} done: {} applied, {} skipped, {} failed",
            event.instance_id,
            report.applied_count(),
            report.skipped_count(),
            report.failed_count()
        );
        report
    }

    /// Merge instance details into the payload and normalize again.
    /// Any failure keeps the event as delivered.
    async fn enrich(&self, raw: &RawEvent, event: ApprovalEvent, snapshot: &ConfigSnapshot) -> ApprovalEvent {
        let Some(forms) = &self.forms else {
            return event;
        };

        let detail = match forms.instance_detail(&event.instance_id).await {
            Ok(detail) => detail,
            Err(e) => {
                log::error!(
                    "Could not fetch details of approval {}, using event data only: {}",
                    event.instance_id,
                    e
                );
                return event;
            }
        };

        let Ok(payload) = payload_object(raw) else {
            return event;
        };
        let merged = RawEvent {
            event_type: raw.event_type.clone(),
            event_id: raw.event_id.clone(),
            data: Value::Object(merge_detail(&payload, &detail)),
        };
        match normalize(&merged, snapshot.default_operator_id.as_deref()) {
            Ok(enriched) => {
                log::debug!(
                    "Enriched approval {}: {} form fields",
                    enriched.instance_id,
                    enriched.form_fields.len()
                );
                ApprovalEvent {
                    // Identity stays as delivered
                    operator_id: event.operator_id,
                    ..enriched
                }
            }
            Err(reason) => {
                log::warn!("Ignoring details of approval {}: {}", event.instance_id, reason);
                event
            }
        }
    }

    async fn run_rules(
        &self,
        rules: &[&ApprovalRule],
        event: &ApprovalEvent,
        snapshot: &ConfigSnapshot,
    ) -> Vec<ActionReport> {
        let tasks = rules.iter().flat_map(|rule| {
            rule.actions
                .iter()
                .enumerate()
                .map(move |(index, action)| self.run_action(rule, index, action, event, snapshot))
        });
        join_all(tasks).await
    }

    async fn run_action(
        &self,
        rule: &ApprovalRule,
        index: usize,
        action: &SyncAction,
        event: &ApprovalEvent,
        snapshot: &ConfigSnapshot,
    ) -> ActionReport {
        let outcome = self.execute(action, event, snapshot).await;
        match &outcome {
            SyncOutcome::Applied {
                record_id,
                updated_fields,
            } => log::info!(
                "[{}#{}] {}: updated {} fields of record {}",
                rule.name,
                index,
                action.target,
                updated_fields,
                record_id
            ),
            SyncOutcome::Skipped(reason) => {
                log::info!("[{}#{}] {}: skipped ({:?})", rule.name, index, action.target, reason)
            }
            SyncOutcome::Failed(kind) => log::error!("[{}#{}] {}: failed: {}", rule.name, index, action.target, kind),
        }
        ActionReport {
            rule_name: rule.name.clone(),
            action_index: index,
            target: action.target.clone(),
            outcome,
        }
    }

    async fn execute(&self, action: &SyncAction, event: &ApprovalEvent, snapshot: &ConfigSnapshot) -> SyncOutcome {
        let resolved = match resolve_action(action, event, self.clock.as_ref(), &snapshot.timestamp_format) {
            Ok(resolved) => resolved,
            Err(kind) => return SyncOutcome::Failed(kind),
        };

        let lookup = self
            .gateway
            .find_record(&resolved.lookup, &event.operator_id, &snapshot.gateway)
            .await;
        let record_id = match lookup {
            Ok(LookupResult::Found(record_id)) => record_id,
            Ok(LookupResult::NotFound) => return SyncOutcome::Skipped(SkipReason::NoMatchingRecord),
            Ok(LookupResult::Ambiguous(matches)) => {
                return SyncOutcome::Failed(FailureKind::AmbiguousLookup { matches });
            }
            Err(failure) => return SyncOutcome::Failed(failure_kind(failure)),
        };

        if resolved.assignments.is_empty() {
            return SyncOutcome::Skipped(SkipReason::NoFieldUpdates { record_id });
        }

        let updated_fields = assignments_to_fields(&resolved.assignments).len();
        match self
            .gateway
            .apply_updates(
                &action.target,
                &record_id,
                &resolved.assignments,
                &event.operator_id,
                &snapshot.gateway.retry,
            )
            .await
        {
            Ok(()) => SyncOutcome::Applied {
                record_id,
                updated_fields,
            },
            Err(failure) => SyncOutcome::Failed(failure_kind(failure)),
        }
    }
}

fn failure_kind(failure: GatewayFailure) -> FailureKind {
    if failure.error.is_transient() {
        FailureKind::TransientGateway {
            attempts: failure.attempts,
            message: failure.error.to_string(),
        }
    } else {
        FailureKind::FatalGateway {
            message: failure.error.to_string(),
        }
    }
}
