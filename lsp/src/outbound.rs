//! Single writer for everything the server sends.
//!
//! Responses, notifications and server-initiated requests are queued on an
//! mpsc channel and written in order by one task that owns the
//! [`FrameWriter`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use crate::codec::FrameWriter;
use crate::protocol::{self, Notification, Request, RequestError};

pub(crate) enum WriterCommand {
    Send(Value),
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
#[error("outbound channel closed")]
pub struct OutboundClosed;

#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::Sender<WriterCommand>,
    next_id: Arc<AtomicU64>,
}

impl Outbound {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<WriterCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            rx,
        )
    }

    async fn send(&self, frame: Value) -> Result<(), OutboundClosed> {
        self.tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| OutboundClosed)
    }

    pub async fn respond(
        &self,
        id: Value,
        result: Result<Value, RequestError>,
    ) -> Result<(), OutboundClosed> {
        let frame = match result {
            Ok(value) => protocol::success_response(id, value),
            Err(err) => protocol::error_response(id, &err),
        };
        self.send(frame).await
    }

    pub async fn notify<P: Serialize>(
        &self,
        method: &'static str,
        params: &P,
    ) -> Result<(), OutboundClosed> {
        match notification_frame(method, params) {
            Some(frame) => self.send(frame).await,
            None => Ok(()),
        }
    }

    /// Reserve a slot in the writer queue. A frame sent through the permit
    /// is queued at the point it is sent, with no await in between.
    pub(crate) async fn reserve(&self) -> Result<OutboundPermit<'_>, OutboundClosed> {
        self.tx
            .reserve()
            .await
            .map(OutboundPermit)
            .map_err(|_| OutboundClosed)
    }

    /// Send a server-initiated request. The client's response is not
    /// awaited. Returns the id used.
    pub async fn request(
        &self,
        method: &'static str,
        params: Option<Value>,
    ) -> Result<u64, OutboundClosed> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_value(Request::new(id, method, params)).unwrap_or(Value::Null);
        self.send(frame).await?;
        Ok(id)
    }

    pub(crate) async fn shutdown(&self) {
        let _ = self.tx.send(WriterCommand::Shutdown).await;
    }
}

pub(crate) struct OutboundPermit<'a>(mpsc::Permit<'a, WriterCommand>);

impl OutboundPermit<'_> {
    pub(crate) fn notify<P: Serialize>(self, method: &'static str, params: &P) {
        if let Some(frame) = notification_frame(method, params) {
            self.0.send(WriterCommand::Send(frame));
        }
    }
}

fn notification_frame<P: Serialize>(method: &'static str, params: &P) -> Option<Value> {
    let params = match serde_json::to_value(params) {
        Ok(params) => params,
        Err(err) => {
            tracing::warn!("Failed to encode {method} params: {err}");
            return None;
        }
    };
    Some(serde_json::to_value(Notification::new(method, Some(params))).unwrap_or(Value::Null))
}

pub(crate) async fn run_writer<W: AsyncWrite + Unpin>(
    mut writer: FrameWriter<W>,
    mut rx: mpsc::Receiver<WriterCommand>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriterCommand::Send(frame) => {
                if let Err(e) = writer.write_frame(&frame).await {
                    tracing::warn!("LSP write error: {e}");
                    break;
                }
            }
            WriterCommand::Shutdown => break,
        }
    }
}

#[cfg(test)]
pub(crate) fn expect_sent(cmd: Option<WriterCommand>) -> Value {
    match cmd {
        Some(WriterCommand::Send(frame)) => frame,
        Some(WriterCommand::Shutdown) => panic!("expected Send, got Shutdown"),
        None => panic!("expected Send, channel was empty"),
    }
}
