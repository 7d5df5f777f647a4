//! approval-sync - DingTalk approval events into Notable records
//!
//! approval-sync listens for approval status changes, matches finished and
//! agreed instances against configured rules, and writes form values into the
//! matching rows of Notable spreadsheets.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod dingtalk;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod sync;
pub mod transport;

pub use error::{Result, SyncError};
