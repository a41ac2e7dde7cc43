//! Authentication handshake
//!
//! One-shot credential exchange gating all further traffic: the credential
//! frame is the very first message on the session, and exactly one response
//! frame is awaited before anything else may be sent.

use url::Url;

use corelink_protocol::{AuthRequest, AuthResponse};
use corelink_utils::{CorelinkError, Result};

use crate::transport::{SessionState, Transport};

/// Fallback user when neither the arguments nor the URL provide one
const DEFAULT_USER: &str = "guest";

/// Resolve the credentials to authenticate with.
///
/// Explicit arguments override URL-embedded credentials; with neither, the
/// guest account with an empty password is used.
pub fn resolve_credentials(
    url: &Url,
    user: Option<&str>,
    password: Option<&str>,
) -> (String, String) {
    let user = user
        .map(str::to_string)
        .or_else(|| {
            let embedded = url.username();
            (!embedded.is_empty()).then(|| embedded.to_string())
        })
        .unwrap_or_else(|| DEFAULT_USER.to_string());

    let password = password
        .map(str::to_string)
        .or_else(|| url.password().map(str::to_string))
        .unwrap_or_default();

    (user, password)
}

/// Perform the credential exchange on a freshly connected transport.
///
/// On rejection the transport is closed first, then an authentication error
/// carrying the server's message is returned. A malformed or missing
/// response is a protocol error.
pub async fn authenticate(transport: &mut Transport, user: &str, password: &str) -> Result<()> {
    let request = AuthRequest {
        user: user.into(),
        password: password.into(),
    };
    let text = request
        .encode()
        .map_err(|e| CorelinkError::protocol(e.to_string()))?;
    transport.send(text).await?;

    let Some(reply) = transport.next_frame().await else {
        return Err(CorelinkError::protocol(
            "connection closed before authentication result",
        ));
    };
    let response = AuthResponse::decode(&reply)
        .map_err(|e| CorelinkError::protocol(format!("bad authentication result: {}", e)))?;

    if !response.authenticated {
        transport.close().await;
        let message = response
            .error
            .unwrap_or_else(|| "rejected by server".to_string());
        return Err(CorelinkError::Authentication(message));
    }

    transport.shared().set_state(SessionState::Open);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn test_explicit_credentials_win() {
        let url = Url::parse("ws://alice:secret@core.local/").unwrap();
        let (user, password) = resolve_credentials(&url, Some("bob"), Some("hunter2"));
        assert_eq!(user, "bob");
        assert_eq!(password, "hunter2");
    }

    #[test]
    fn test_url_credentials_as_fallback() {
        let url = Url::parse("ws://alice:secret@core.local/").unwrap();
        let (user, password) = resolve_credentials(&url, None, None);
        assert_eq!(user, "alice");
        assert_eq!(password, "secret");
    }

    #[test]
    fn test_guest_default() {
        let url = Url::parse("ws://core.local/").unwrap();
        let (user, password) = resolve_credentials(&url, None, None);
        assert_eq!(user, "guest");
        assert_eq!(password, "");
    }

    async fn bind() -> (tokio::net::TcpListener, Url) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("ws://{}", listener.local_addr().unwrap())).unwrap();
        (listener, url)
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let (listener, url) = bind().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let first = ws.next().await.unwrap().unwrap();
            let request = AuthRequest::decode(first.to_text().unwrap()).unwrap();
            assert_eq!(request.user, "alice");
            assert_eq!(request.password, "secret");
            ws.send(Message::Text(r#"{"authenticated":true}"#.into()))
                .await
                .unwrap();
        });

        let mut transport = Transport::connect(&url).await.unwrap();
        authenticate(&mut transport, "alice", "secret").await.unwrap();
        assert_eq!(transport.shared().state(), SessionState::Open);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_authenticate_rejected_carries_server_message() {
        let (listener, url) = bind().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            ws.send(Message::Text(
                r#"{"authenticated":false,"error":"bad password"}"#.into(),
            ))
            .await
            .unwrap();
            // Drain so the client's close handshake completes
            while ws.next().await.is_some() {}
        });

        let mut transport = Transport::connect(&url).await.unwrap();
        let err = authenticate(&mut transport, "alice", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, CorelinkError::Authentication(ref m) if m == "bad password"));
        // The transport was closed before the error was raised
        assert_eq!(transport.shared().state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_authenticate_malformed_response() {
        let (listener, url) = bind().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            ws.send(Message::Text("not json".into())).await.unwrap();
        });

        let mut transport = Transport::connect(&url).await.unwrap();
        let err = authenticate(&mut transport, "alice", "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, CorelinkError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_authenticate_closed_before_response() {
        let (listener, url) = bind().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            ws.close(None).await.unwrap();
        });

        let mut transport = Transport::connect(&url).await.unwrap();
        let err = authenticate(&mut transport, "alice", "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, CorelinkError::Protocol(_)));
    }
}
