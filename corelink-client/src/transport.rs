//! WebSocket transport session
//!
//! Owns the raw socket: connect, send, receive, close. `wss://` endpoints
//! are TLS-secured via rustls. After authentication the transport is split
//! into independent writer and reader halves so outbound sends never block
//! inbound reads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use corelink_utils::{CorelinkError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the connection drops without a close handshake
const ABNORMAL_CLOSE: u16 = 1006;

/// Close code reported when the peer sent an empty close frame
const NO_STATUS: u16 = 1005;

/// Transport session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Open,
    Closing,
    Closed,
}

/// Close code and reason from a remote-initiated close
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// State shared between the writer and reader halves of one session.
///
/// Persists after close so the facade can inspect why the session ended.
#[derive(Debug)]
pub struct SessionShared {
    state: Mutex<SessionState>,
    close_info: Mutex<Option<CloseInfo>>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) fn test_shared() -> Arc<SessionShared> {
    SessionShared::new()
}

impl SessionShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SessionState::Connecting),
            close_info: Mutex::new(None),
        })
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
    }

    /// Whether the session is going away or already gone
    pub fn is_closing(&self) -> bool {
        matches!(self.state(), SessionState::Closing | SessionState::Closed)
    }

    /// Transition to Closing; returns false if another closer got there first
    fn begin_close(&self) -> bool {
        let mut state = lock(&self.state);
        if matches!(*state, SessionState::Closing | SessionState::Closed) {
            return false;
        }
        *state = SessionState::Closing;
        true
    }

    /// Close code/reason if the close was remote-initiated
    pub fn close_info(&self) -> Option<CloseInfo> {
        lock(&self.close_info).clone()
    }

    /// Record a remote close. Ignored when we initiated the close ourselves.
    fn record_remote_close(&self, code: u16, reason: String) {
        if self.is_closing() {
            return;
        }
        let mut info = lock(&self.close_info);
        if info.is_none() {
            *info = Some(CloseInfo { code, reason });
        }
    }
}

/// A connected, not yet split transport session
///
/// Used directly during the authentication handshake, then broken into
/// halves with [`Transport::into_parts`].
#[derive(Debug)]
pub struct Transport {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    shared: Arc<SessionShared>,
}

impl Transport {
    /// Establish the WebSocket connection.
    ///
    /// URL-embedded credentials are stripped before dialing; they are only
    /// used by the authentication handshake. Fails with a transport error on
    /// socket or TLS problems. No retry.
    pub async fn connect(url: &Url) -> Result<Self> {
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(CorelinkError::InvalidUrl {
                    url: url.to_string(),
                    message: format!("unsupported scheme '{}'", other),
                })
            }
        }

        let mut target = url.clone();
        let _ = target.set_username("");
        let _ = target.set_password(None);

        let shared = SessionShared::new();
        let (ws, _response) = connect_async(target.as_str())
            .await
            .map_err(|e| CorelinkError::transport(e.to_string()))?;
        let (sink, stream) = ws.split();
        shared.set_state(SessionState::Authenticating);

        Ok(Self {
            sink,
            stream,
            shared,
        })
    }

    /// Send one text frame
    pub async fn send(&mut self, text: String) -> Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| CorelinkError::transport(e.to_string()))
    }

    /// Await the next text frame; `None` once the socket is closed
    pub async fn next_frame(&mut self) -> Option<String> {
        next_text(&mut self.stream, &self.shared).await
    }

    /// Gracefully close the socket. Idempotent.
    pub async fn close(&mut self) {
        close_sink(&mut self.sink, &self.shared).await;
    }

    /// Handle to the shared session state
    pub fn shared(&self) -> Arc<SessionShared> {
        self.shared.clone()
    }

    /// Split into independent writer and reader halves
    pub fn into_parts(self) -> (TransportWriter, TransportReader) {
        let writer = TransportWriter {
            sink: self.sink,
            shared: self.shared.clone(),
        };
        let reader = TransportReader {
            stream: self.stream,
            shared: self.shared,
        };
        (writer, reader)
    }
}

/// Outbound half of a split transport
pub struct TransportWriter {
    sink: SplitSink<WsStream, Message>,
    shared: Arc<SessionShared>,
}

impl TransportWriter {
    /// Send one text frame
    pub async fn send(&mut self, text: String) -> Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| CorelinkError::transport(e.to_string()))
    }

    /// Gracefully close the socket. Idempotent.
    pub async fn close(&mut self) {
        close_sink(&mut self.sink, &self.shared).await;
    }

    pub fn shared(&self) -> Arc<SessionShared> {
        self.shared.clone()
    }
}

/// Inbound half of a split transport
///
/// Yields a finite, per-session sequence of text frames that terminates
/// when the socket closes. A remote-initiated close records its code and
/// reason in the shared session state.
pub struct TransportReader {
    stream: SplitStream<WsStream>,
    shared: Arc<SessionShared>,
}

impl TransportReader {
    /// Await the next text frame; `None` once the socket is closed
    pub async fn next_frame(&mut self) -> Option<String> {
        next_text(&mut self.stream, &self.shared).await
    }

    pub fn shared(&self) -> Arc<SessionShared> {
        self.shared.clone()
    }
}

async fn next_text(stream: &mut SplitStream<WsStream>, shared: &SessionShared) -> Option<String> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Some(text),
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = match frame {
                    Some(f) => (u16::from(f.code), f.reason.to_string()),
                    None => (NO_STATUS, String::new()),
                };
                shared.record_remote_close(code, reason);
                shared.set_state(SessionState::Closed);
                return None;
            }
            // Ping/pong are handled by tungstenite; binary frames are not
            // part of the protocol
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                shared.record_remote_close(ABNORMAL_CLOSE, e.to_string());
                shared.set_state(SessionState::Closed);
                return None;
            }
            None => {
                shared.set_state(SessionState::Closed);
                return None;
            }
        }
    }
}

async fn close_sink(sink: &mut SplitSink<WsStream, Message>, shared: &SessionShared) {
    if !shared.begin_close() {
        return;
    }
    if let Err(e) = sink.send(Message::Close(None)).await {
        tracing::debug!("close frame not sent: {}", e);
    }
    let _ = sink.close().await;
    shared.set_state(SessionState::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    async fn ws_url(listener: &tokio::net::TcpListener) -> Url {
        let addr = listener.local_addr().unwrap();
        Url::parse(&format!("ws://{}", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_scheme() {
        let url = Url::parse("http://localhost:1234").unwrap();
        let err = Transport::connect(&url).await.unwrap_err();
        assert!(matches!(err, CorelinkError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 1 is essentially never listening
        let url = Url::parse("ws://127.0.0.1:1").unwrap();
        let err = Transport::connect(&url).await.unwrap_err();
        assert!(matches!(err, CorelinkError::Transport(_)));
    }

    #[tokio::test]
    async fn test_text_frames_round_trip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = ws_url(&listener).await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let msg = ws.next().await.unwrap().unwrap();
            ws.send(msg).await.unwrap();
        });

        let mut transport = Transport::connect(&url).await.unwrap();
        assert_eq!(transport.shared().state(), SessionState::Authenticating);

        transport.send("hello".into()).await.unwrap();
        let echoed = transport.next_frame().await.unwrap();
        assert_eq!(echoed, "hello");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_close_records_code_and_reason() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = ws_url(&listener).await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Library(4000),
                reason: "maintenance".into(),
            }))
            .await
            .unwrap();
        });

        let mut transport = Transport::connect(&url).await.unwrap();
        assert!(transport.next_frame().await.is_none());

        let shared = transport.shared();
        assert_eq!(shared.state(), SessionState::Closed);
        let info = shared.close_info().unwrap();
        assert_eq!(info.code, 4000);
        assert_eq!(info.reason, "maintenance");
    }

    #[tokio::test]
    async fn test_local_close_is_silent_and_idempotent() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = ws_url(&listener).await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            // Drain until the client's close completes the handshake
            while ws.next().await.is_some() {}
        });

        let mut transport = Transport::connect(&url).await.unwrap();
        transport.close().await;
        transport.close().await;

        let shared = transport.shared();
        assert_eq!(shared.state(), SessionState::Closed);
        // Local close: nothing to report
        assert!(shared.close_info().is_none());
        assert!(transport.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_split_halves_work_independently() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = ws_url(&listener).await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() {
                    ws.send(msg).await.unwrap();
                }
            }
        });

        let transport = Transport::connect(&url).await.unwrap();
        let (mut writer, mut reader) = transport.into_parts();

        writer.send("one".into()).await.unwrap();
        writer.send("two".into()).await.unwrap();
        assert_eq!(reader.next_frame().await.unwrap(), "one");
        assert_eq!(reader.next_frame().await.unwrap(), "two");

        writer.close().await;
        assert!(reader.next_frame().await.is_none());
    }
}
