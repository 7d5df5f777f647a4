//! Daemon - the long-running event loop
//!
//! The daemon:
//! - Takes deliveries from the transport one at a time, in receipt order
//! - Runs each through the orchestrator and acknowledges it afterwards
//! - Replays push-failed events at startup and after every config reload
//! - Stops taking deliveries on shutdown; the event in hand completes first

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::dingtalk::{DingTalkClient, FailedEventBatch};
use crate::domain::{Disposition, EventReport, RawEvent};
use crate::error::Result;
use crate::gateway::{GatewayError, TableStore};
use crate::sync::SyncOrchestrator;
use crate::transport::{AckStatus, EventTransport};

/// Source of events the upstream failed to push
#[async_trait]
pub trait FailedEventFeed: Send + Sync {
    async fn fetch_failed(&self) -> std::result::Result<FailedEventBatch, GatewayError>;
}

#[async_trait]
impl FailedEventFeed for DingTalkClient {
    async fn fetch_failed(&self) -> std::result::Result<FailedEventBatch, GatewayError> {
        self.failed_events().await
    }
}

/// Counters for one daemon run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub deliveries: u64,
    pub replayed: u64,
    pub processed: u64,
    pub ignored: u64,
    pub applied: u64,
    pub skipped: u64,
    pub failed: u64,
    pub system_errors: u64,
}

impl RunSummary {
    fn record(&mut self, report: &EventReport) {
        match report.disposition {
            Disposition::Processed(_) => self.processed += 1,
            _ => self.ignored += 1,
        }
        self.applied += report.applied_count() as u64;
        self.skipped += report.skipped_count() as u64;
        self.failed += report.failed_count() as u64;
    }
}

/// Event loop over a transport
pub struct SyncDaemon<S: TableStore + 'static, T: EventTransport> {
    orchestrator: Arc<SyncOrchestrator<S>>,
    transport: T,
    feed: Option<Arc<dyn FailedEventFeed>>,
    summary: RunSummary,
}

impl<S: TableStore + 'static, T: EventTransport> SyncDaemon<S, T> {
    pub fn new(orchestrator: Arc<SyncOrchestrator<S>>, transport: T) -> Self {
        Self {
            orchestrator,
            transport,
            feed: None,
            summary: RunSummary::default(),
        }
    }

    /// Replay failed events from `feed` at startup and after reloads
    pub fn with_failed_feed(mut self, feed: Arc<dyn FailedEventFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Run until the transport ends or `shutdown` resolves
    pub async fn run<F>(mut self, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        let mut reloads = self.orchestrator.snapshots().subscribe();
        reloads.borrow_and_update();

        self.replay_failed().await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    log::info!("Shutdown requested, no longer taking deliveries");
                    break;
                }
                changed = reloads.changed() => {
                    if changed.is_ok() {
                        let version = reloads.borrow_and_update().version;
                        log::info!("Config v{} active, checking for failed events", version);
                        self.replay_failed().await;
                    }
                }
                delivery = self.transport.next_delivery() => {
                    let Some(delivery) = delivery? else {
                        log::info!("Transport closed");
                        break;
                    };
                    self.summary.deliveries += 1;
                    let status = self.dispatch(delivery.event.clone()).await;
                    self.transport.acknowledge(&delivery, status).await?;
                }
            }
        }

        log::info!("Daemon stopped: {:?}", self.summary);
        Ok(self.summary)
    }

    /// Run one event to completion in its own task
    async fn dispatch(&mut self, event: RawEvent) -> AckStatus {
        let orchestrator = Arc::clone(&self.orchestrator);
        match tokio::spawn(async move { orchestrator.handle(&event).await }).await {
            Ok(report) => {
                self.summary.record(&report);
                AckStatus::Ok
            }
            Err(e) => {
                log::error!("Event handling aborted: {}", e);
                self.summary.system_errors += 1;
                AckStatus::SystemException(e.to_string())
            }
        }
    }

    async fn replay_failed(&mut self) {
        let Some(feed) = self.feed.clone() else {
            return;
        };
        let batch = match feed.fetch_failed().await {
            Ok(batch) => batch,
            Err(e) => {
                log::warn!("Could not fetch failed events: {}", e);
                return;
            }
        };
        if batch.events.is_empty() {
            log::info!("No failed events to replay");
            return;
        }

        log::info!("Replaying {} failed events", batch.events.len());
        for event in batch.events {
            self.summary.replayed += 1;
            if let AckStatus::SystemException(msg) = self.dispatch(event).await {
                log::error!("Replayed event failed: {}", msg);
            }
        }
        if batch.has_more {
            log::warn!("More failed events remain upstream; they are picked up on the next replay");
        }
    }
}
