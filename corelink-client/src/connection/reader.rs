//! Inbound reader task
//!
//! Drains the stream half of the transport and feeds every frame to the
//! object channel in arrival order. When the stream ends because the server
//! closed the connection, the channel is torn down and the remote-close
//! notification fires so the facade can finish the disconnect; a locally
//! initiated close ends the task silently.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use corelink_protocol::ServerFrame;

use crate::channel::ObjectChannel;
use crate::transport::TransportReader;

pub fn spawn_reader(
    mut reader: TransportReader,
    channel: Arc<ObjectChannel>,
    remote_close: oneshot::Sender<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(text) = reader.next_frame().await {
            match ServerFrame::decode(&text) {
                Ok(frame) => channel.handle_incoming(frame),
                Err(e) => tracing::warn!("dropping malformed frame: {}", e),
            }
        }

        let shared = reader.shared();
        if let Some(info) = shared.close_info() {
            tracing::info!(
                code = info.code,
                reason = %info.reason,
                "connection closed by server"
            );
            channel.teardown();
            let _ = remote_close.send(());
        }
    })
}
