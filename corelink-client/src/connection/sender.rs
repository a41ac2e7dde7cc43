//! Outbound send queue
//!
//! A single writer task owns the sink half of the transport and drains an
//! unbounded queue of frames. Submission is synchronous and never fails:
//! each send is an independent unit of work, and a send that races with a
//! closing session is dropped with a debug log rather than surfaced as an
//! error.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use corelink_protocol::ClientFrame;

use crate::transport::{SessionShared, TransportWriter};

pub(crate) enum Outbound {
    Frame(ClientFrame),
    Shutdown(oneshot::Sender<()>),
}

/// Handle for queueing frames onto the session's writer task
#[derive(Clone)]
pub struct SendQueue {
    tx: mpsc::UnboundedSender<Outbound>,
    shared: Arc<SessionShared>,
}

impl SendQueue {
    /// Spawn the writer task and return the queue handle
    pub fn spawn(writer: TransportWriter) -> Self {
        let shared = writer.shared();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(writer, rx));
        Self { tx, shared }
    }

    /// Queue one frame for sending.
    ///
    /// Sends racing a session close are expected and suppressed; frames
    /// queued on a live session are delivered in submission order.
    pub fn send(&self, frame: ClientFrame) {
        if self.shared.is_closing() {
            tracing::debug!("send on closing session suppressed");
            return;
        }
        if self.tx.send(Outbound::Frame(frame)).is_err() {
            tracing::debug!("send after writer shutdown suppressed");
        }
    }

    /// Close the transport gracefully and wait until the close frame is out.
    /// Idempotent.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Outbound::Shutdown(ack_tx)).is_err() {
            // Writer task already gone, nothing left to close
            return;
        }
        let _ = ack_rx.await;
    }
}

async fn write_loop(mut writer: TransportWriter, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    let shared = writer.shared();
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Frame(frame) => {
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("failed to encode outbound frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = writer.send(text).await {
                    if shared.is_closing() {
                        tracing::debug!("send lost to closing transport: {}", e);
                    } else {
                        tracing::error!("failed to send frame: {}", e);
                    }
                }
            }
            Outbound::Shutdown(ack) => {
                writer.close().await;
                let _ = ack.send(());
                break;
            }
        }
    }
}

/// Queue wired to a plain channel instead of a socket, for channel tests
#[cfg(test)]
pub(crate) fn test_queue(
    shared: Arc<SessionShared>,
) -> (SendQueue, mpsc::UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SendQueue { tx, shared }, rx)
}
