//! Table store seam: the raw list/update calls the gateway builds on.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::error::GatewayError;
use crate::domain::{RecordId, ScalarValue, TableTarget};

/// One page request against a sheet, filtered by `field_name == value`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub field_name: String,
    pub value: ScalarValue,
    pub page_size: u32,
    /// Continuation token from the previous page
    pub next_token: Option<String>,
}

/// A record as returned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub fields: Map<String, Value>,
}

/// One page of records in store order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordPage {
    pub records: Vec<StoredRecord>,
    /// Present when more pages follow
    pub next_token: Option<String>,
}

/// Raw access to a tabular store. Implementations make exactly one remote
/// call per method; retries and pagination live in `TableGateway`.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// List one page of records matching the query
    async fn list_records(
        &self,
        target: &TableTarget,
        query: &RecordQuery,
        operator_id: &str,
    ) -> Result<RecordPage, GatewayError>;

    /// Overwrite the given fields of one record in a single batched call
    async fn update_record(
        &self,
        target: &TableTarget,
        record_id: &str,
        fields: &Map<String, Value>,
        operator_id: &str,
    ) -> Result<(), GatewayError>;
}
