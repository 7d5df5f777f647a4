//! Event Normalizer: vendor payload to [`ApprovalEvent`].
//!
//! Events that cannot be acted on are discarded with a reason rather than
//! treated as errors.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::domain::{ApprovalEvent, ApprovalResult, DiscardReason, RawEvent, ScalarValue};

/// Operator identity keys in precedence order
const OPERATOR_KEYS: [&str; 3] = ["operatorUnionId", "operator", "originatorUnionId"];

/// Top-level keys that never become form fields
const RESERVED_KEYS: [&str; 3] = ["formComponentValues", "result", "taskId"];

const FORM_COMPONENTS: &str = "formComponentValues";

/// Payload of a raw event as a JSON object. String payloads are parsed first.
pub fn payload_object(raw: &RawEvent) -> Result<Map<String, Value>, DiscardReason> {
    match &raw.data {
        Value::Object(map) => Ok(map.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(DiscardReason::MalformedPayload(format!("expected an object, got {}", kind(&other)))),
            Err(e) => Err(DiscardReason::MalformedPayload(e.to_string())),
        },
        other => Err(DiscardReason::MalformedPayload(format!("expected an object, got {}", kind(other)))),
    }
}

/// Turn a raw event into a canonical approval event.
///
/// `default_operator` is used only when the payload names no operator.
pub fn normalize(raw: &RawEvent, default_operator: Option<&str>) -> Result<ApprovalEvent, DiscardReason> {
    if !raw.is_approval() {
        return Err(DiscardReason::UnsupportedEventType(raw.event_type.clone()));
    }

    let data = payload_object(raw)?;
    let template_id = required_str(&data, "processCode")?;
    let instance_id = required_str(&data, "processInstanceId")?;
    let result = ApprovalResult::parse(data.get("result").and_then(Value::as_str));

    let operator_id = OPERATOR_KEYS
        .iter()
        .find_map(|key| non_empty_str(&data, key))
        .or_else(|| default_operator.filter(|op| !op.trim().is_empty()).map(str::to_string));
    let Some(operator_id) = operator_id else {
        log::warn!(
            "Approval {} ({}) has no operator identity and no default_operator_id is configured",
            instance_id,
            template_id
        );
        return Err(DiscardReason::MissingOperator);
    };

    Ok(ApprovalEvent {
        template_id,
        result,
        operator_id,
        form_fields: extract_form_fields(&data),
        instance_id,
    })
}

/// Collect form fields from `formComponentValues` plus top-level scalars.
///
/// Components win over top-level keys of the same name. A component's
/// `extValue` is kept under `<name>_ext`.
pub fn extract_form_fields(data: &Map<String, Value>) -> BTreeMap<String, ScalarValue> {
    let mut fields = BTreeMap::new();

    if let Some(components) = data.get(FORM_COMPONENTS).and_then(Value::as_array) {
        for component in components {
            let Some(name) = component.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) else {
                continue;
            };
            if let Some(value) = component.get("value") {
                insert_scalar(&mut fields, name.to_string(), value);
            }
            match component.get("extValue") {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) if s.is_empty() => {}
                Some(ext) => insert_scalar(&mut fields, format!("{}_ext", name), ext),
            }
        }
    }

    for (key, value) in data {
        if RESERVED_KEYS.contains(&key.as_str()) || fields.contains_key(key) {
            continue;
        }
        if let Some(scalar) = ScalarValue::from_json(value) {
            fields.insert(key.clone(), scalar);
        }
    }

    fields
}

fn insert_scalar(fields: &mut BTreeMap<String, ScalarValue>, key: String, value: &Value) {
    match ScalarValue::from_json(value) {
        Some(scalar) => {
            fields.insert(key, scalar);
        }
        None => log::debug!("Dropping non-scalar form value for '{}': {}", key, kind(value)),
    }
}

fn required_str(data: &Map<String, Value>, key: &'static str) -> Result<String, DiscardReason> {
    non_empty_str(data, key).ok_or(DiscardReason::MissingField(key))
}

fn non_empty_str(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
