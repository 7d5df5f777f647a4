//! YAML shape of `approvals[]` and its conversion into validated rules.

use serde::{Deserialize, Serialize};

use super::app::SpreadsheetConfig;
use crate::domain::{
    ApprovalRule, FieldUpdateSpec, LookupSource, LookupSpec, ScalarValue, SyncAction, TableTarget, UpdateSource,
};
use crate::error::{Result, SyncError};

/// The only action type currently understood
pub const UPDATE_SPREADSHEET: &str = "update_spreadsheet";

fn default_true() -> bool {
    true
}

fn default_action_type() -> String {
    UPDATE_SPREADSHEET.to_string()
}

/// One approval template and its actions
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApprovalConfig {
    /// Display name used in logs
    pub name: String,

    /// DingTalk process code
    pub template_id: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionConfig {
    #[serde(rename = "type", default = "default_action_type")]
    pub action_type: String,

    /// Falls back to `spreadsheet.base_id`
    #[serde(default)]
    pub base_id: Option<String>,

    /// Falls back to `spreadsheet.default_sheet_id`
    #[serde(default)]
    pub sheet_id: Option<String>,

    pub find_by: FindByConfig,

    #[serde(default)]
    pub updates: Vec<UpdateFieldConfig>,
}

/// `find_by`: destination field plus `form_field` or `value`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FindByConfig {
    pub field_name: String,
    #[serde(default)]
    pub form_field: Option<String>,
    #[serde(default)]
    pub value: Option<ScalarValue>,
}

/// `updates[]`: destination field plus exactly one of `form_field`, `value`, `timestamp: true`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateFieldConfig {
    pub field_name: String,
    #[serde(default)]
    pub form_field: Option<String>,
    #[serde(default)]
    pub value: Option<ScalarValue>,
    #[serde(default)]
    pub timestamp: bool,
}

impl ApprovalConfig {
    /// Validate and convert into a domain rule
    pub fn to_rule(&self, defaults: &SpreadsheetConfig) -> Result<ApprovalRule> {
        if self.template_id.trim().is_empty() {
            return Err(SyncError::Config("template_id is empty".to_string()));
        }
        let actions = self
            .actions
            .iter()
            .enumerate()
            .map(|(index, action)| {
                action
                    .to_action(defaults)
                    .map_err(|e| SyncError::Config(format!("actions[{}]: {}", index, describe(&e))))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ApprovalRule {
            name: self.name.clone(),
            template_id: self.template_id.clone(),
            enabled: self.enabled,
            actions,
        })
    }
}

impl ActionConfig {
    pub fn to_action(&self, defaults: &SpreadsheetConfig) -> Result<SyncAction> {
        if self.action_type != UPDATE_SPREADSHEET {
            return Err(SyncError::Config(format!(
                "unsupported action type '{}' (expected {})",
                self.action_type, UPDATE_SPREADSHEET
            )));
        }

        let base_id = non_empty(self.base_id.as_ref())
            .or_else(|| non_empty(defaults.base_id.as_ref()))
            .ok_or_else(|| SyncError::Config("no base_id and no spreadsheet.base_id".to_string()))?;
        let sheet_id = non_empty(self.sheet_id.as_ref())
            .or_else(|| non_empty(defaults.default_sheet_id.as_ref()))
            .ok_or_else(|| SyncError::Config("no sheet_id and no spreadsheet.default_sheet_id".to_string()))?;

        let updates = self
            .updates
            .iter()
            .enumerate()
            .map(|(index, update)| {
                update
                    .to_spec()
                    .map_err(|e| SyncError::Config(format!("updates[{}]: {}", index, describe(&e))))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SyncAction {
            target: TableTarget::new(base_id, sheet_id),
            find_by: self.find_by.to_spec()?,
            updates,
        })
    }
}

impl FindByConfig {
    pub fn to_spec(&self) -> Result<LookupSpec> {
        if self.field_name.trim().is_empty() {
            return Err(SyncError::Config("find_by.field_name is empty".to_string()));
        }
        let source = match (&self.form_field, &self.value) {
            (Some(key), None) => LookupSource::FormField(key.clone()),
            (None, Some(value)) => LookupSource::Literal(value.clone()),
            (None, None) => {
                return Err(SyncError::Config(
                    "find_by needs one of form_field or value".to_string(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(SyncError::Config(
                    "find_by takes form_field or value, not both".to_string(),
                ));
            }
        };
        Ok(LookupSpec {
            target_field_name: self.field_name.clone(),
            source,
        })
    }
}

impl UpdateFieldConfig {
    pub fn to_spec(&self) -> Result<FieldUpdateSpec> {
        if self.field_name.trim().is_empty() {
            return Err(SyncError::Config("field_name is empty".to_string()));
        }
        let mut sources = Vec::with_capacity(1);
        if let Some(key) = &self.form_field {
            sources.push(UpdateSource::FormField(key.clone()));
        }
        if let Some(value) = &self.value {
            sources.push(UpdateSource::Literal(value.clone()));
        }
        if self.timestamp {
            sources.push(UpdateSource::Timestamp);
        }

        match sources.len() {
            1 => Ok(FieldUpdateSpec {
                target_field_name: self.field_name.clone(),
                source: sources.remove(0),
            }),
            0 => Err(SyncError::Config(format!(
                "'{}' needs one of form_field, value or timestamp",
                self.field_name
            ))),
            _ => Err(SyncError::Config(format!(
                "'{}' has more than one value source",
                self.field_name
            ))),
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

/// Inner message of a nested config error, without the variant prefix
fn describe(err: &SyncError) -> String {
    match err {
        SyncError::Config(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> SpreadsheetConfig {
        SpreadsheetConfig {
            base_id: Some("base-default".to_string()),
            default_sheet_id: Some("sheet-default".to_string()),
            ..Default::default()
        }
    }

    fn parse(yaml: &str) -> ApprovalConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_rule_with_defaults_applied() {
        let config = parse(
            r#"
name: 请假审批
template_id: proc_leave
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
"#,
        );

        let rule = config.to_rule(&defaults()).unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.actions.len(), 1);

        let action = &rule.actions[0];
        assert_eq!(action.target, TableTarget::new("base-default", "sheet-default"));
        assert_eq!(action.find_by.source, LookupSource::FormField("employee_id".to_string()));
        assert_eq!(action.updates[0].source, UpdateSource::FormField("leave_days".to_string()));
        assert_eq!(action.updates[1].source, UpdateSource::Literal(ScalarValue::from("已审批")));
        assert_eq!(action.updates[2].source, UpdateSource::Timestamp);
    }

    #[test]
    fn test_action_target_overrides_defaults() {
        let config = parse(
            r#"
name: r
template_id: p
actions:
  - base_id: b2
    sheet_id: s2
    find_by:
      field_name: 工号
      value: 42
"#,
        );
        let rule = config.to_rule(&defaults()).unwrap();
        assert_eq!(rule.actions[0].target, TableTarget::new("b2", "s2"));
        assert_eq!(rule.actions[0].find_by.source, LookupSource::Literal(ScalarValue::from(42)));
        assert!(rule.actions[0].updates.is_empty());
    }

    #[test]
    fn test_missing_target_is_rejected() {
        let config = parse(
            r#"
name: r
template_id: p
actions:
  - find_by:
      field_name: 工号
      form_field: id
"#,
        );
        let err = config.to_rule(&SpreadsheetConfig::default()).unwrap_err();
        assert!(err.to_string().contains("base_id"));
    }

    #[test]
    fn test_update_without_source_is_rejected() {
        let update = UpdateFieldConfig {
            field_name: "状态".to_string(),
            form_field: None,
            value: None,
            timestamp: false,
        };
        assert!(update.to_spec().is_err());
    }

    #[test]
    fn test_update_with_two_sources_is_rejected() {
        let update = UpdateFieldConfig {
            field_name: "状态".to_string(),
            form_field: Some("status".to_string()),
            value: None,
            timestamp: true,
        };
        let err = update.to_spec().unwrap_err();
        assert!(err.to_string().contains("more than one"));
    }

    #[test]
    fn test_find_by_with_both_sources_is_rejected() {
        let find_by = FindByConfig {
            field_name: "工号".to_string(),
            form_field: Some("id".to_string()),
            value: Some(ScalarValue::from("E1")),
        };
        assert!(find_by.to_spec().is_err());
    }

    #[test]
    fn test_unknown_action_type_is_rejected() {
        let config = parse(
            r#"
name: r
template_id: p
actions:
  - type: shell
    find_by:
      field_name: 工号
      form_field: id
"#,
        );
        let err = config.to_rule(&defaults()).unwrap_err();
        assert!(err.to_string().contains("unsupported action type 'shell'"));
    }

    #[test]
    fn test_empty_template_id_is_rejected() {
        let config = parse("name: r\ntemplate_id: ''\n");
        assert!(config.to_rule(&defaults()).is_err());
    }
}
