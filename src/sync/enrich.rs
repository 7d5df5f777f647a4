//! Form enrichment from process instance details.
//!
//! Event payloads often carry only identifiers. For agreed events that match a
//! rule, the full instance is fetched and its keys merged into the payload
//! before the event is normalized again.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::gateway::GatewayError;

/// Keys that identify the event and are never taken from the details
const PROTECTED_KEYS: [&str; 3] = ["processCode", "processInstanceId", "result"];

/// Looks up the full details of an approval instance
#[async_trait]
pub trait FormDetailSource: Send + Sync {
    /// Instance object, expected to carry `formComponentValues`
    async fn instance_detail(&self, instance_id: &str) -> Result<Value, GatewayError>;
}

/// Overlay `detail` onto an event payload. Detail keys win, except the
/// identifying ones.
pub fn merge_detail(payload: &Map<String, Value>, detail: &Value) -> Map<String, Value> {
    let mut merged = payload.clone();
    if let Some(detail) = detail.as_object() {
        for (key, value) in detail {
            if PROTECTED_KEYS.contains(&key.as_str()) && merged.contains_key(key) {
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
