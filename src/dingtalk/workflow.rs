//! Process instance details, used to fill in form fields the event lacks.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use super::DingTalkClient;
use crate::gateway::GatewayError;
use crate::sync::FormDetailSource;

/// [`FormDetailSource`] backed by `GET /v1.0/workflow/processInstances`
#[derive(Debug, Clone)]
pub struct WorkflowForms {
    client: Arc<DingTalkClient>,
}

impl WorkflowForms {
    pub fn new(client: Arc<DingTalkClient>) -> Self {
        Self { client }
    }
}

/// Pull `result` out of a `{success, result}` envelope
pub(crate) fn unwrap_instance(body: Value) -> Result<Value, GatewayError> {
    let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
    match body {
        Value::Object(mut map) if success => map
            .remove("result")
            .filter(Value::is_object)
            .ok_or_else(|| GatewayError::InvalidResponse("process instance without result".to_string())),
        other => Err(GatewayError::Rejected {
            status: 200,
            message: format!("process instance lookup unsuccessful: {}", other),
        }),
    }
}

#[async_trait]
impl FormDetailSource for WorkflowForms {
    async fn instance_detail(&self, instance_id: &str) -> Result<Value, GatewayError> {
        let mut url = self.client.api_url(&["v1.0", "workflow", "processInstances"])?;
        url.query_pairs_mut().append_pair("processInstanceId", instance_id);

        let body = self.client.call_api(Method::GET, url, None).await?;
        let detail = unwrap_instance(body)?;
        log::debug!("Fetched process instance {}", instance_id);
        Ok(detail)
    }
}
