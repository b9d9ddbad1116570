//! Session manager: keep one connection to the chat gateway alive, reconnecting after a fixed
//! delay, and hand inbound events to the registered handler in arrival order.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channels::inbound::{encode_action, InboundEvent, ReplyTarget};
use crate::channels::state::{ConnectionState, ConnectionStatus};
use crate::channels::transport::{Connector, FrameStream, Handshake, WsConnector};
use crate::config::{self, Config};

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const LOGGED_FRAME_CHARS: usize = 200;

/// Callbacks for one session. Events are delivered one at a time on the receive loop, so a
/// slow `on_event` delays the frames behind it.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_event(&self, session: &SessionManager, event: InboundEvent);

    /// Called after each successful handshake.
    async fn on_connect(&self, _session: &SessionManager) {}

    /// Called after a failed attempt or a closed connection.
    async fn on_disconnect(&self, _session: &SessionManager) {}
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub url: String,
    pub token: Option<String>,
    pub reconnect_delay: Duration,
}

impl SessionOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Options from config; None when `ws_url` is not set.
    pub fn from_config(config: &Config) -> Option<Self> {
        let url = config.ws_url()?;
        Some(
            Self::new(url)
                .with_token(config::resolve_token(config))
                .with_reconnect_delay(config.reconnect_delay()),
        )
    }
}

pub struct SessionManager {
    handshake: Handshake,
    reconnect_delay: Duration,
    connector: Arc<dyn Connector>,
    handler: Arc<dyn MessageHandler>,
    state: Mutex<ConnectionState>,
    stop: CancellationToken,
}

impl SessionManager {
    pub fn new(options: SessionOptions, handler: Arc<dyn MessageHandler>) -> Self {
        Self::with_connector(options, Arc::new(WsConnector), handler)
    }

    pub fn with_connector(
        options: SessionOptions,
        connector: Arc<dyn Connector>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            handshake: Handshake {
                url: options.url,
                token: options.token,
            },
            reconnect_delay: options.reconnect_delay,
            connector,
            handler,
            state: Mutex::new(ConnectionState::Disconnected),
            stop: CancellationToken::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.handshake.url
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.state.lock().await.status()
    }

    pub async fn is_connected(&self) -> bool {
        self.status().await == ConnectionStatus::Connected
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Connect and keep reconnecting until `disconnect` is called. Runs on the calling task.
    pub async fn run(&self) {
        while !self.stop.is_cancelled() {
            self.connect_once().await;
            if self.stop.is_cancelled() {
                break;
            }
            log::info!(
                "session: reconnecting in {}s",
                self.reconnect_delay.as_secs_f64()
            );
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        log::info!("session: stopped");
    }

    /// Run the reconnect loop on a background task.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move { session.run().await })
    }

    /// Stop reconnecting and close the connection if open. Safe to call more than once.
    pub async fn disconnect(&self) {
        let first = !self.stop.is_cancelled();
        self.stop.cancel();
        self.mark_disconnected().await;
        if first {
            log::info!("session: disconnected from {}", self.handshake.url);
        }
    }

    /// Send `{ "action", "params" }`. False when not connected or the write fails.
    pub async fn send(&self, action: &str, params: Value) -> bool {
        let mut state = self.state.lock().await;
        let ConnectionState::Connected(sink) = &mut *state else {
            log::warn!("session: not connected, cannot send {}", action);
            return false;
        };
        let frame = match encode_action(action, params) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("session: encoding {} failed: {}", action, e);
                return false;
            }
        };
        match sink.send(frame).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("session: send {} failed: {}", action, e);
                false
            }
        }
    }

    pub async fn reply(&self, target: ReplyTarget, message: &str) -> bool {
        self.send(target.action(), target.params(message)).await
    }

    pub async fn send_private_msg(&self, user_id: i64, message: &str) -> bool {
        self.reply(ReplyTarget::Private(user_id), message).await
    }

    pub async fn send_group_msg(&self, group_id: i64, message: &str) -> bool {
        self.reply(ReplyTarget::Group(group_id), message).await
    }

    async fn connect_once(&self) {
        *self.state.lock().await = ConnectionState::Connecting;
        log::info!("session: connecting to {}", self.handshake.url);

        let opened = tokio::select! {
            _ = self.stop.cancelled() => {
                self.mark_disconnected().await;
                return;
            }
            res = self.connector.open(&self.handshake) => res,
        };
        let mut stream = match opened {
            Ok((mut sink, stream)) => {
                let mut state = self.state.lock().await;
                if self.stop.is_cancelled() {
                    // disconnect() won the race while the handshake was in flight.
                    *state = ConnectionState::Disconnected;
                    drop(state);
                    let _ = sink.close().await;
                    return;
                }
                *state = ConnectionState::Connected(sink);
                drop(state);
                log::info!("session: connected to {}", self.handshake.url);
                self.handler.on_connect(self).await;
                stream
            }
            Err(e) => {
                log::warn!("session: connecting to {} failed: {}", self.handshake.url, e);
                self.mark_disconnected().await;
                self.handler.on_disconnect(self).await;
                return;
            }
        };

        self.receive(&mut stream).await;
        self.mark_disconnected().await;
        self.handler.on_disconnect(self).await;
    }

    async fn receive(&self, stream: &mut FrameStream) {
        loop {
            let frame = tokio::select! {
                _ = self.stop.cancelled() => return,
                frame = stream.next() => frame,
            };
            match frame {
                Some(Ok(text)) => self.dispatch(&text).await,
                Some(Err(e)) => {
                    log::warn!("session: receive failed: {}", e);
                    return;
                }
                None => {
                    log::info!("session: connection closed by peer");
                    return;
                }
            }
        }
    }

    async fn dispatch(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                let shown: String = text.chars().take(LOGGED_FRAME_CHARS).collect();
                log::warn!("session: dropping non-JSON frame ({}): {}", e, shown);
                return;
            }
        };
        let event = InboundEvent::from_value(value);
        self.handler.on_event(self, event).await;
    }

    async fn mark_disconnected(&self) {
        let sink = self.state.lock().await.take_sink();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                log::debug!("session: closing transport: {}", e);
            }
        }
    }
}
