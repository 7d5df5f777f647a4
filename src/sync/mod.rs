//! Sync engine
//!
//! Event → Normalizer → Matcher → Resolver → Gateway, per matched rule:
//! - `normalizer`: vendor payload to `ApprovalEvent`
//! - `matcher`: enabled rules for the event's template
//! - `resolver`: lookup and field assignments for one action
//! - `dedup`: recent instance ids, absorbing redelivery
//! - `enrich`: instance details merged into thin payloads
//! - `orchestrator`: ties the above together per event

pub mod dedup;
pub mod enrich;
pub mod matcher;
pub mod normalizer;
pub mod orchestrator;
pub mod resolver;

pub use dedup::RecentEvents;
pub use enrich::{FormDetailSource, merge_detail};
pub use matcher::match_rules;
pub use normalizer::{extract_form_fields, normalize, payload_object};
pub use orchestrator::SyncOrchestrator;
pub use resolver::{Clock, FixedClock, ResolvedAction, SystemClock, is_valid_timestamp_format, resolve_action};
