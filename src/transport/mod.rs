//! Event transport seam.
//!
//! A transport hands over raw events one at a time, in receipt order, and
//! takes an acknowledgement for each once it has been handled.

pub mod jsonl;

use std::fmt;

use async_trait::async_trait;

pub use jsonl::JsonLinesTransport;

use crate::domain::RawEvent;
use crate::error::Result;

/// One event as delivered, with the id used to acknowledge it
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: String,
    pub event: RawEvent,
}

/// Acknowledgement sent back to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckStatus {
    /// Handled; do not redeliver
    Ok,
    /// Handling broke down; the upstream may redeliver
    SystemException(String),
}

impl AckStatus {
    /// Wire name of the status
    pub fn code(&self) -> &'static str {
        match self {
            AckStatus::Ok => "OK",
            AckStatus::SystemException(_) => "SYSTEM_EXCEPTION",
        }
    }
}

impl fmt::Display for AckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckStatus::Ok => write!(f, "OK"),
            AckStatus::SystemException(msg) => write!(f, "SYSTEM_EXCEPTION: {}", msg),
        }
    }
}

/// Source of approval events
#[async_trait]
pub trait EventTransport: Send {
    /// Next delivery, or `None` once the stream has ended
    async fn next_delivery(&mut self) -> Result<Option<Delivery>>;

    /// Acknowledge a delivery
    async fn acknowledge(&mut self, delivery: &Delivery, status: AckStatus) -> Result<()>;
}
