//! JSON-lines transport.
//!
//! Reads one event per line (`{"event_type", "event_id"?, "data"}`) from any
//! async reader and writes one acknowledgement per line
//! (`{"delivery_id", "status", "message"?}`) to any async writer.
//! Unparseable lines are logged and skipped.

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};

use super::{AckStatus, Delivery, EventTransport};
use crate::domain::RawEvent;
use crate::error::{Result, SyncError};

#[derive(Debug, Serialize)]
struct AckLine<'a> {
    delivery_id: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

/// Events from a line-oriented stream; acks to a writer
pub struct JsonLinesTransport<R, W> {
    lines: Lines<R>,
    acks: W,
    line_number: u64,
}

impl<R, W> JsonLinesTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, acks: W) -> Self {
        Self {
            lines: reader.lines(),
            acks,
            line_number: 0,
        }
    }
}

#[async_trait]
impl<R, W> EventTransport for JsonLinesTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn next_delivery(&mut self) -> Result<Option<Delivery>> {
        loop {
            let Some(line) = self
                .lines
                .next_line()
                .await
                .map_err(|e| SyncError::Transport(format!("read failed: {}", e)))?
            else {
                return Ok(None);
            };
            self.line_number += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawEvent>(line) {
                Ok(event) => {
                    let id = event
                        .event_id
                        .clone()
                        .unwrap_or_else(|| format!("line-{}", self.line_number));
                    log::debug!("Received {} event {}", event.event_type, id);
                    return Ok(Some(Delivery { id, event }));
                }
                Err(e) => log::warn!("Skipping unreadable event on line {}: {}", self.line_number, e),
            }
        }
    }

    async fn acknowledge(&mut self, delivery: &Delivery, status: AckStatus) -> Result<()> {
        let ack = AckLine {
            delivery_id: &delivery.id,
            status: status.code(),
            message: match &status {
                AckStatus::Ok => None,
                AckStatus::SystemException(msg) => Some(msg.as_str()),
            },
        };
        let mut line = serde_json::to_vec(&ack)?;
        line.push(b'\n');
        self.acks.write_all(&line).await?;
        self.acks.flush().await?;
        log::debug!("Acknowledged {} with {}", delivery.id, status.code());
        Ok(())
    }
}
