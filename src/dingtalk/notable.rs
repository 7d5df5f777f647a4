//! Notable (AI table) records over the v1.0 API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::DingTalkClient;
use crate::domain::TableTarget;
use crate::gateway::{GatewayError, RecordPage, RecordQuery, StoredRecord, TableStore};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListRecordsResponse {
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_token: Option<String>,
    #[serde(default)]
    records: Vec<RecordBody>,
}

#[derive(Debug, Deserialize)]
struct RecordBody {
    id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct UpdateRecordsResponse {
    #[serde(default)]
    value: Vec<UpdatedRecord>,
}

#[derive(Debug, Deserialize)]
struct UpdatedRecord {
    id: String,
}

/// [`TableStore`] backed by DingTalk Notable
#[derive(Debug, Clone)]
pub struct NotableStore {
    client: Arc<DingTalkClient>,
}

impl NotableStore {
    pub fn new(client: Arc<DingTalkClient>) -> Self {
        Self { client }
    }

    fn records_url(&self, target: &TableTarget, tail: &[&str], operator_id: &str) -> Result<Url, GatewayError> {
        let mut segments = vec![
            "v1.0",
            "notable",
            "bases",
            target.base_id.as_str(),
            "sheets",
            target.sheet_id.as_str(),
            "records",
        ];
        segments.extend_from_slice(tail);
        let mut url = self.client.api_url(&segments)?;
        url.query_pairs_mut().append_pair("operatorId", operator_id);
        Ok(url)
    }
}

/// Request body for `records/list`
pub(crate) fn list_body(query: &RecordQuery) -> Value {
    let mut body = json!({
        "maxResults": query.page_size,
        "filter": {
            "combination": "and",
            "conditions": [{
                "field": query.field_name,
                "operator": "equal",
                "value": [query.value.to_json()],
            }],
        },
    });
    if let Some(token) = &query.next_token {
        body["nextToken"] = json!(token);
    }
    body
}

#[async_trait]
impl TableStore for NotableStore {
    async fn list_records(
        &self,
        target: &TableTarget,
        query: &RecordQuery,
        operator_id: &str,
    ) -> Result<RecordPage, GatewayError> {
        let url = self.records_url(target, &["list"], operator_id)?;
        let body = self.client.call_api(Method::POST, url, Some(&list_body(query))).await?;
        let response: ListRecordsResponse = serde_json::from_value(body)
            .map_err(|e| GatewayError::InvalidResponse(format!("records/list: {}", e)))?;

        log::debug!(
            "records/list {} {}={}: {} records, has_more={}",
            target,
            query.field_name,
            query.value,
            response.records.len(),
            response.has_more
        );

        let next_token = if response.has_more {
            response.next_token.filter(|t| !t.is_empty())
        } else {
            None
        };
        Ok(RecordPage {
            records: response
                .records
                .into_iter()
                .map(|r| StoredRecord {
                    id: r.id,
                    fields: r.fields,
                })
                .collect(),
            next_token,
        })
    }

    async fn update_record(
        &self,
        target: &TableTarget,
        record_id: &str,
        fields: &Map<String, Value>,
        operator_id: &str,
    ) -> Result<(), GatewayError> {
        let url = self.records_url(target, &[], operator_id)?;
        let body = json!({ "records": [{ "id": record_id, "fields": fields }] });
        let response = self.client.call_api(Method::PUT, url, Some(&body)).await?;
        let response: UpdateRecordsResponse = serde_json::from_value(response)
            .map_err(|e| GatewayError::InvalidResponse(format!("records update: {}", e)))?;

        if !response.value.is_empty() && !response.value.iter().any(|r| r.id == record_id) {
            return Err(GatewayError::RecordNotFound(record_id.to_string()));
        }
        Ok(())
    }
}
