//! Chat bot: answer `:`-prefixed chat messages from the gateway through the agent.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::{ChatAgent, Speaker};
use crate::channels::{InboundEvent, MessageHandler, SessionManager, SessionOptions};
use crate::config::Config;
use crate::init;

/// Prefixes that mark a message as addressed to the bot (ASCII and full-width colon).
const CHAT_PREFIXES: [char; 2] = [':', '：'];

/// Chat text of a message addressed to the bot, or None when the bot should stay quiet.
pub fn chat_text(raw: &str) -> Option<&str> {
    let text = raw.trim().strip_prefix(CHAT_PREFIXES)?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// History and mode key for a chat user.
pub fn session_key(user_id: i64) -> String {
    format!("user_{}", user_id)
}

pub struct BotHandler {
    agent: ChatAgent,
    admin_qq: Option<i64>,
}

impl BotHandler {
    pub fn new(agent: ChatAgent, admin_qq: Option<i64>) -> Self {
        Self { agent, admin_qq }
    }

    pub fn agent(&self) -> &ChatAgent {
        &self.agent
    }

    fn speaker(&self, user_id: i64) -> Speaker {
        if self.admin_qq == Some(user_id) {
            Speaker::Admin
        } else {
            Speaker::User
        }
    }
}

#[async_trait]
impl MessageHandler for BotHandler {
    async fn on_event(&self, session: &SessionManager, event: InboundEvent) {
        let (Some(message), Some(target)) = (event.message(), event.reply_target()) else {
            return;
        };
        let Some(text) = chat_text(&message.text) else {
            return;
        };
        log::info!("bot: chat from {} via {:?}: {}", message.user_id, target, text);
        let key = session_key(message.user_id);
        let reply = self.agent.reply(&key, text, self.speaker(message.user_id)).await;
        if !session.reply(target, &reply).await {
            log::warn!("bot: reply to {:?} was not delivered", target);
        }
    }

    async fn on_connect(&self, session: &SessionManager) {
        log::info!("bot: connected to {}, waiting for messages", session.url());
    }

    async fn on_disconnect(&self, session: &SessionManager) {
        if !session.is_stopped() {
            log::warn!("bot: connection lost, reconnecting");
        }
    }
}

/// Run the bot until Ctrl+C / SIGTERM: connect to the gateway, answer chat messages, then
/// disconnect and stop the execution pool.
pub async fn run_bot(config: Config, config_path: PathBuf) -> Result<()> {
    init::require_initialized(&config_path, &config)?;
    let options = SessionOptions::from_config(&config).context("ws_url is not configured")?;
    let agent = ChatAgent::from_config(&config, &config_path)?;
    if agent.prompts().has_custom() {
        log::info!("bot: using custom chat prompt");
    }
    let gateway = agent.gateway().clone();
    let handler = Arc::new(BotHandler::new(agent, config.admin_qq));
    let session = Arc::new(SessionManager::new(options, handler));

    log::info!("bot: starting, gateway at {}", session.url());
    let mut task = session.spawn();
    tokio::select! {
        _ = shutdown_signal() => {
            log::info!("bot: shutting down");
        }
        res = &mut task => {
            res.context("session task failed")?;
        }
    }
    session.disconnect().await;
    gateway.shutdown();
    if !task.is_finished() {
        task.await.context("session task failed")?;
    }
    log::info!("bot stopped");
    Ok(())
}

/// Completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_prefixed_messages_are_chat() {
        assert_eq!(chat_text(":你好"), Some("你好"));
        assert_eq!(chat_text("  ：  讲个笑话 "), Some("讲个笑话"));
        assert_eq!(chat_text("你好"), None);
        assert_eq!(chat_text(":   "), None);
        assert_eq!(chat_text(""), None);
        assert_eq!(chat_text("a:b"), None);
    }

    #[test]
    fn key_is_per_user() {
        assert_eq!(session_key(10001), "user_10001");
    }
}
