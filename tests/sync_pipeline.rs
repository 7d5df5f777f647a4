//! Sync pipeline integration tests
//!
//! Drives the orchestrator from a YAML config against an in-memory table
//! store that can be scripted to rate-limit updates.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use approval_sync::config::{AppConfig, ConfigSnapshot, SnapshotHandle};
use approval_sync::domain::{Disposition, FailureKind, RawEvent, SkipReason, SyncOutcome, TableTarget, event_types};
use approval_sync::gateway::{GatewayError, RecordPage, RecordQuery, StoredRecord, TableStore};
use approval_sync::sync::{FixedClock, RecentEvents, SyncOrchestrator};
use async_trait::async_trait;
use chrono::{Local, TimeZone};
use serde_json::{Map, Value, json};

const CONFIG: &str = r#"
dingtalk:
  app_key: key
  app_secret: secret
spreadsheet:
  base_id: base-hr
  default_sheet_id: sheet-leave
approvals:
  - name: 请假审批
    template_id: proc_leave_approval
    actions:
      - find_by:
          field_name: 员工工号
          form_field: employee_id
        updates:
          - field_name: 请假天数
            form_field: leave_days
          - field_name: 审批状态
            value: 已审批
          - field_name: 审批时间
            timestamp: true
execution:
  max_retries: 3
  initial_backoff_ms: 1
  max_backoff_ms: 5
"#;

/// Sheet held in memory; updates are merged into the stored rows
#[derive(Default)]
struct MemorySheet {
    rows: Mutex<BTreeMap<String, Map<String, Value>>>,
    rate_limited_updates: Mutex<u32>,
    list_calls: Mutex<usize>,
    update_calls: Mutex<usize>,
}

impl MemorySheet {
    fn with_employee(record_id: &str, employee_id: &str) -> Self {
        let sheet = Self::default();
        let mut fields = Map::new();
        fields.insert("员工工号".to_string(), json!(employee_id));
        sheet.rows.lock().unwrap().insert(record_id.to_string(), fields);
        sheet
    }

    fn rate_limit_next(&self, count: u32) {
        *self.rate_limited_updates.lock().unwrap() = count;
    }

    fn row(&self, record_id: &str) -> Map<String, Value> {
        self.rows.lock().unwrap().get(record_id).cloned().unwrap_or_default()
    }

    fn calls(&self) -> (usize, usize) {
        (*self.list_calls.lock().unwrap(), *self.update_calls.lock().unwrap())
    }
}

#[async_trait]
impl TableStore for MemorySheet {
    async fn list_records(
        &self,
        _target: &TableTarget,
        query: &RecordQuery,
        _operator_id: &str,
    ) -> Result<RecordPage, GatewayError> {
        *self.list_calls.lock().unwrap() += 1;
        let records = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, fields)| fields.get(&query.field_name).is_some_and(|c| query.value.matches_cell(c)))
            .map(|(id, fields)| StoredRecord {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect();
        Ok(RecordPage {
            records,
            next_token: None,
        })
    }

    async fn update_record(
        &self,
        _target: &TableTarget,
        record_id: &str,
        fields: &Map<String, Value>,
        _operator_id: &str,
    ) -> Result<(), GatewayError> {
        *self.update_calls.lock().unwrap() += 1;
        {
            let mut remaining = self.rate_limited_updates.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GatewayError::RateLimited { retry_after: None });
            }
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(record_id)
            .ok_or_else(|| GatewayError::RecordNotFound(record_id.to_string()))?;
        for (name, value) in fields {
            row.insert(name.clone(), value.clone());
        }
        Ok(())
    }
}

fn snapshot(yaml: &str) -> ConfigSnapshot {
    let config = AppConfig::from_yaml(yaml).unwrap();
    ConfigSnapshot::from_config(&config, 1).unwrap()
}

fn orchestrator(sheet: Arc<MemorySheet>, snapshot: ConfigSnapshot) -> SyncOrchestrator<MemorySheet> {
    let clock = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
    SyncOrchestrator::new(sheet, SnapshotHandle::new(snapshot), RecentEvents::new(64, None))
        .with_clock(Arc::new(FixedClock(clock)))
}

fn leave_event(instance: &str, result: &str, form: Value) -> RawEvent {
    let mut data = json!({
        "processCode": "proc_leave_approval",
        "processInstanceId": instance,
        "result": result,
        "operatorUnionId": "union-1"
    });
    if let (Some(data), Some(form)) = (data.as_object_mut(), form.as_object()) {
        for (key, value) in form {
            data.insert(key.clone(), value.clone());
        }
    }
    RawEvent::new(event_types::INSTANCE_CHANGE, data).with_event_id(format!("msg-{}", instance))
}

fn leave_form() -> Value {
    json!({"employee_id": "E100", "leave_days": 3, "leave_reason": "sick"})
}

#[tokio::test]
async fn test_agreed_leave_is_applied() {
    let sheet = Arc::new(MemorySheet::with_employee("rec-7", "E100"));
    let orchestrator = orchestrator(sheet.clone(), snapshot(CONFIG));

    let report = orchestrator.handle(&leave_event("inst-1", "agree", leave_form())).await;

    assert_eq!(
        report.actions()[0].outcome,
        SyncOutcome::Applied {
            record_id: "rec-7".to_string(),
            updated_fields: 3
        }
    );
    let row = sheet.row("rec-7");
    assert_eq!(row["请假天数"], json!(3));
    assert_eq!(row["审批状态"], json!("已审批"));
    assert_eq!(row["审批时间"], json!("2024-05-01 09:30:00"));
    assert_eq!(sheet.calls(), (1, 1));
}

#[tokio::test]
async fn test_no_matching_record_is_skipped() {
    let sheet = Arc::new(MemorySheet::with_employee("rec-7", "E999"));
    let orchestrator = orchestrator(sheet.clone(), snapshot(CONFIG));

    let report = orchestrator.handle(&leave_event("inst-1", "agree", leave_form())).await;

    assert_eq!(
        report.actions()[0].outcome,
        SyncOutcome::Skipped(SkipReason::NoMatchingRecord)
    );
    // Lookup only, no update
    assert_eq!(sheet.calls(), (1, 0));
}

#[tokio::test]
async fn test_missing_lookup_field_fails_without_calls() {
    let yaml = CONFIG.replace("form_field: employee_id", "form_field: employee_code");
    let sheet = Arc::new(MemorySheet::with_employee("rec-7", "E100"));
    let orchestrator = orchestrator(sheet.clone(), snapshot(&yaml));

    let report = orchestrator.handle(&leave_event("inst-1", "agree", leave_form())).await;

    assert_eq!(
        report.actions()[0].outcome,
        SyncOutcome::Failed(FailureKind::MissingFormField {
            key: "employee_code".to_string()
        })
    );
    assert_eq!(sheet.calls(), (0, 0));
}

#[tokio::test]
async fn test_missing_field_leaves_sibling_action_running() {
    let yaml = CONFIG.replace(
        "execution:",
        r#"      - find_by:
          field_name: 员工工号
          form_field: employee_code
        updates:
          - field_name: 备注
            value: 已同步
execution:"#,
    );
    let sheet = Arc::new(MemorySheet::with_employee("rec-7", "E100"));
    let orchestrator = orchestrator(sheet.clone(), snapshot(&yaml));

    let report = orchestrator.handle(&leave_event("inst-1", "agree", leave_form())).await;

    assert_eq!(report.actions().len(), 2);
    assert!(report.actions()[0].outcome.is_applied());
    assert_eq!(
        report.actions()[1].outcome,
        SyncOutcome::Failed(FailureKind::MissingFormField {
            key: "employee_code".to_string()
        })
    );
    assert_eq!(sheet.calls(), (1, 1));
    assert!(sheet.row("rec-7").get("备注").is_none());
}

#[tokio::test]
async fn test_rate_limited_update_is_retried() {
    let sheet = Arc::new(MemorySheet::with_employee("rec-7", "E100"));
    sheet.rate_limit_next(3);
    let orchestrator = orchestrator(sheet.clone(), snapshot(CONFIG));

    let report = orchestrator.handle(&leave_event("inst-1", "agree", leave_form())).await;

    assert!(report.actions()[0].outcome.is_applied());
    // One lookup, reused across four update attempts
    assert_eq!(sheet.calls(), (1, 4));
}

#[tokio::test]
async fn test_rate_limit_past_budget_fails_and_allows_redelivery() {
    let sheet = Arc::new(MemorySheet::with_employee("rec-7", "E100"));
    sheet.rate_limit_next(4);
    let orchestrator = orchestrator(sheet.clone(), snapshot(CONFIG));
    let event = leave_event("inst-1", "agree", leave_form());

    let report = orchestrator.handle(&event).await;
    assert!(matches!(
        report.actions()[0].outcome,
        SyncOutcome::Failed(FailureKind::TransientGateway { attempts: 4, .. })
    ));

    // A redelivery is processed again rather than treated as a duplicate
    let report = orchestrator.handle(&event).await;
    assert!(report.actions()[0].outcome.is_applied());
}

#[tokio::test]
async fn test_refused_approval_makes_no_calls() {
    let sheet = Arc::new(MemorySheet::with_employee("rec-7", "E100"));
    let orchestrator = orchestrator(sheet.clone(), snapshot(CONFIG));

    let report = orchestrator.handle(&leave_event("inst-1", "refuse", leave_form())).await;

    assert!(matches!(report.disposition, Disposition::NotAgreed(_)));
    assert_eq!(sheet.calls(), (0, 0));
}

#[tokio::test]
async fn test_unknown_template_is_ignored() {
    let sheet = Arc::new(MemorySheet::with_employee("rec-7", "E100"));
    let orchestrator = orchestrator(sheet.clone(), snapshot(CONFIG));
    let mut event = leave_event("inst-1", "agree", leave_form());
    event.data["processCode"] = json!("proc_expense");

    let report = orchestrator.handle(&event).await;

    assert_eq!(report.disposition, Disposition::NoMatchingRule);
    assert_eq!(sheet.calls(), (0, 0));
}

#[tokio::test]
async fn test_reapplying_leaves_the_same_row() {
    let sheet = Arc::new(MemorySheet::with_employee("rec-7", "E100"));
    let event = leave_event("inst-1", "agree", leave_form());

    orchestrator(sheet.clone(), snapshot(CONFIG)).handle(&event).await;
    let first = sheet.row("rec-7");

    // A fresh process has no memory of the first delivery
    let report = orchestrator(sheet.clone(), snapshot(CONFIG)).handle(&event).await;
    assert!(report.actions()[0].outcome.is_applied());
    assert_eq!(sheet.row("rec-7"), first);
}

#[tokio::test]
async fn test_events_use_the_snapshot_captured_at_dispatch() {
    let sheet = Arc::new(MemorySheet::with_employee("rec-7", "E100"));
    let orchestrator = orchestrator(sheet.clone(), snapshot(CONFIG));
    let captured = orchestrator.snapshots().current();

    // Reload disables every rule
    let disabled = CONFIG.replace("template_id: proc_leave_approval", "template_id: proc_leave_approval\n    enabled: false");
    let published = orchestrator.snapshots().publish(snapshot(&disabled));
    assert_eq!(published.version, 2);

    // In flight before the reload: old rules apply in full
    let report = orchestrator
        .handle_with(&leave_event("inst-1", "agree", leave_form()), &captured)
        .await;
    assert_eq!(report.applied_count(), 1);

    // Dispatched after the reload: new rules apply in full
    let report = orchestrator.handle(&leave_event("inst-2", "agree", leave_form())).await;
    assert_eq!(report.disposition, Disposition::NoMatchingRule);
    assert_eq!(sheet.calls(), (1, 1));
}
