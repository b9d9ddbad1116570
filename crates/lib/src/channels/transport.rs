//! Transport: open one connection to the chat gateway as a sink of outgoing text frames and a
//! stream of incoming ones. `WsConnector` is the WebSocket implementation.

use async_trait::async_trait;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::tungstenite::{
    self,
    client::IntoClientRequest,
    handshake::client::Request,
    http::{header::AUTHORIZATION, HeaderValue},
    Message,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid handshake request: {0}")]
    Request(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("encoding frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outgoing text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = SessionError> + Send>>;

/// Incoming text frames; ends when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, SessionError>> + Send>>;

/// Where to connect and how to authenticate.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub url: String,
    pub token: Option<String>,
}

/// Opens a single connection. Called again for every reconnect attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, handshake: &Handshake) -> Result<(FrameSink, FrameStream), SessionError>;
}

/// WebSocket connector (ws:// and wss:// as supported by tokio-tungstenite).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, handshake: &Handshake) -> Result<(FrameSink, FrameStream), SessionError> {
        let request = build_request(handshake)?;
        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
        let (write, read) = ws.split();
        let sink = write
            .sink_map_err(SessionError::from)
            .with(|text: String| future::ready(Ok::<_, SessionError>(Message::Text(text))));
        let stream = read.filter_map(|msg| future::ready(frame_text(msg)));
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// Handshake request with `Authorization: Bearer <token>` when a token is set.
pub fn build_request(handshake: &Handshake) -> Result<Request, SessionError> {
    let mut request = handshake.url.as_str().into_client_request()?;
    if let Some(ref token) = handshake.token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| SessionError::Request(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

/// Text payload of a frame; control frames are skipped, binary frames are read as UTF-8.
fn frame_text(msg: Result<Message, tungstenite::Error>) -> Option<Result<String, SessionError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
            Ok(text) => Some(Ok(text)),
            Err(_) => {
                log::warn!("session: dropping non-UTF-8 binary frame");
                None
            }
        },
        Ok(_) => None,
        Err(e) => Some(Err(e.into())),
    }
}
