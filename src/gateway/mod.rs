//! Tabular Store Gateway
//!
//! Wraps a [`TableStore`] with what the sync engine relies on:
//! - pagination-aware lookup until a match or exhaustion
//! - configurable handling of lookups matching several records
//! - bounded exponential backoff on transient failures for both calls

pub mod error;
pub mod retry;
pub mod store;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use error::{GatewayError, GatewayFailure};
pub use retry::{RetryPolicy, parse_retry_after, with_retry};
pub use store::{RecordPage, RecordQuery, StoredRecord, TableStore};

use crate::domain::{FieldAssignment, RecordId, RecordLookupRequest, TableTarget, assignments_to_fields};

/// Upper bound on pages scanned by one lookup
const MAX_LOOKUP_PAGES: usize = 1000;

/// What to do when a lookup matches more than one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Use the first record in store order and log a warning
    #[default]
    FirstMatch,
    /// Fail the action
    Error,
}

/// Per-call gateway settings, taken from the active config snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    pub retry: RetryPolicy,
    pub page_size: u32,
    pub on_ambiguous: AmbiguityPolicy,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            page_size: 100,
            on_ambiguous: AmbiguityPolicy::FirstMatch,
        }
    }
}

/// Result of a record lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    Found(RecordId),
    NotFound,
    /// Several records matched under `AmbiguityPolicy::Error`
    Ambiguous(usize),
}

/// Lookup and update operations with retry, over any [`TableStore`]
pub struct TableGateway<S: TableStore> {
    store: Arc<S>,
}

impl<S: TableStore> Clone for TableGateway<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: TableStore> TableGateway<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Find the record whose `field_name` equals the expected value.
    ///
    /// Pages are fetched until a match decides the result or the store runs
    /// out of pages. The server-side filter is trusted; when a returned record
    /// carries the field, it is also checked client-side.
    pub async fn find_record(
        &self,
        request: &RecordLookupRequest,
        operator_id: &str,
        settings: &GatewaySettings,
    ) -> Result<LookupResult, GatewayFailure> {
        let mut query = RecordQuery {
            field_name: request.field_name.clone(),
            value: request.expected_value.clone(),
            page_size: settings.page_size,
            next_token: None,
        };
        let mut first: Option<RecordId> = None;
        let mut matches = 0usize;

        for page_number in 1..=MAX_LOOKUP_PAGES {
            let page = with_retry(&settings.retry, "list records", || {
                self.store.list_records(&request.target, &query, operator_id)
            })
            .await?;

            for record in &page.records {
                let confirmed = record
                    .fields
                    .get(&request.field_name)
                    .is_none_or(|cell| request.expected_value.matches_cell(cell));
                if confirmed {
                    matches += 1;
                    if first.is_none() {
                        first = Some(record.id.clone());
                    }
                }
            }

            let decided = match settings.on_ambiguous {
                AmbiguityPolicy::FirstMatch => first.is_some(),
                AmbiguityPolicy::Error => matches > 1,
            };
            if decided {
                break;
            }

            match page.next_token {
                Some(token) if !token.is_empty() => query.next_token = Some(token),
                _ => break,
            }

            if page_number == MAX_LOOKUP_PAGES {
                log::warn!(
                    "Lookup {}={} in {} stopped after {} pages",
                    request.field_name,
                    request.expected_value,
                    request.target,
                    MAX_LOOKUP_PAGES
                );
            }
        }

        Ok(match first {
            None => {
                log::info!(
                    "No record matches {}={} in {}",
                    request.field_name,
                    request.expected_value,
                    request.target
                );
                LookupResult::NotFound
            }
            Some(record_id) if matches == 1 => LookupResult::Found(record_id),
            Some(record_id) => match settings.on_ambiguous {
                AmbiguityPolicy::FirstMatch => {
                    log::warn!(
                        "{} records match {}={} in {}; using first: {}",
                        matches,
                        request.field_name,
                        request.expected_value,
                        request.target,
                        record_id
                    );
                    LookupResult::Found(record_id)
                }
                AmbiguityPolicy::Error => {
                    log::warn!(
                        "{} records match {}={} in {}; refusing to pick one",
                        matches,
                        request.field_name,
                        request.expected_value,
                        request.target
                    );
                    LookupResult::Ambiguous(matches)
                }
            },
        })
    }

    /// Send all assignments for one record as a single batched update
    pub async fn apply_updates(
        &self,
        target: &TableTarget,
        record_id: &str,
        assignments: &[FieldAssignment],
        operator_id: &str,
        retry: &RetryPolicy,
    ) -> Result<(), GatewayFailure> {
        let fields = assignments_to_fields(assignments);
        with_retry(retry, "update record", || {
            self.store.update_record(target, record_id, &fields, operator_id)
        })
        .await?;
        log::info!(
            "Updated record {} in {}: fields={:?}",
            record_id,
            target,
            fields.keys().collect::<Vec<_>>()
        );
        Ok(())
    }
}
