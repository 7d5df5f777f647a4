//! Push-failed event feed (`/call_back/get_call_back_failed_result`).
//!
//! DingTalk keeps events it could not deliver for a while; they are fetched
//! at startup and after a reload and fed through the normal pipeline.

use serde_json::Value;

use super::DingTalkClient;
use crate::domain::RawEvent;
use crate::gateway::GatewayError;

/// One fetch of the failed-event feed
#[derive(Debug, Clone, Default)]
pub struct FailedEventBatch {
    pub events: Vec<RawEvent>,
    /// Entries that could not be turned into events
    pub skipped: usize,
    pub has_more: bool,
}

impl DingTalkClient {
    /// Fetch events DingTalk failed to push
    pub async fn failed_events(&self) -> Result<FailedEventBatch, GatewayError> {
        let url = self.oapi_url(&["call_back", "get_call_back_failed_result"])?;
        let body = self.call_oapi(url).await?;
        let batch = parse_failed_events(&body);
        log::info!(
            "Failed-event feed: {} events, {} unreadable, has_more={}",
            batch.events.len(),
            batch.skipped,
            batch.has_more
        );
        Ok(batch)
    }
}

/// Parse the feed body.
///
/// Each entry names its type in `call_back_tag` and carries the payload under
/// that same key. Entries without a tag use their first key as the type.
pub fn parse_failed_events(body: &Value) -> FailedEventBatch {
    let has_more = body.get("has_more").and_then(Value::as_bool).unwrap_or(false);
    let entries = body.get("failed_list").and_then(Value::as_array).cloned().unwrap_or_default();

    let mut batch = FailedEventBatch {
        has_more,
        ..Default::default()
    };
    for entry in &entries {
        match parse_entry(entry) {
            Some(event) => batch.events.push(event),
            None => {
                log::warn!("Unreadable failed-event entry: {}", entry);
                batch.skipped += 1;
            }
        }
    }
    batch
}

fn parse_entry(entry: &Value) -> Option<RawEvent> {
    let map = entry.as_object()?;
    let tag = match map.get("call_back_tag").and_then(Value::as_str) {
        Some(tag) => tag.to_string(),
        None => map.keys().find(|k| k.as_str() != "event_time")?.clone(),
    };

    let data = match map.get(&tag)? {
        Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())),
        other => other.clone(),
    };

    let mut event = RawEvent::new(tag, data);
    if let Some(time) = map.get("event_time").and_then(Value::as_i64) {
        let id = format!("failed-{}-{}", event.event_type, time);
        event = event.with_event_id(id);
    }
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event_types;
    use serde_json::json;

    #[test]
    fn test_parse_tagged_entries() {
        let batch = parse_failed_events(&json!({
            "errcode": 0,
            "has_more": true,
            "failed_list": [{
                "call_back_tag": "bpms_instance_change",
                "event_time": 1700000000000i64,
                "bpms_instance_change": "{\"processInstanceId\":\"inst-1\",\"result\":\"agree\"}"
            }]
        }));

        assert!(batch.has_more);
        assert_eq!(batch.events.len(), 1);
        let event = &batch.events[0];
        assert_eq!(event.event_type, event_types::INSTANCE_CHANGE);
        assert_eq!(event.data["processInstanceId"], "inst-1");
        assert_eq!(event.event_id.as_deref(), Some("failed-bpms_instance_change-1700000000000"));
    }

    #[test]
    fn test_parse_untagged_entry_uses_first_key() {
        let batch = parse_failed_events(&json!({
            "failed_list": [{"bpms_task_change": {"processInstanceId": "inst-2"}}]
        }));
        assert_eq!(batch.events[0].event_type, event_types::TASK_CHANGE);
        assert_eq!(batch.events[0].data["processInstanceId"], "inst-2");
        assert!(batch.events[0].event_id.is_none());
    }

    #[test]
    fn test_parse_skips_unreadable_entries() {
        let batch = parse_failed_events(&json!({
            "failed_list": [
                "not an object",
                {"call_back_tag": "bpms_task_change"},
                {}
            ]
        }));
        assert!(batch.events.is_empty());
        assert_eq!(batch.skipped, 3);
    }

    #[test]
    fn test_parse_empty_feed() {
        let batch = parse_failed_events(&json!({"errcode": 0}));
        assert!(batch.events.is_empty());
        assert!(!batch.has_more);
    }
}
