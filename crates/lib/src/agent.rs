//! Agent turn: pick the system prompt, prepend history, run the prompt through the execution
//! gateway, and record the exchange.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::config::{self, Config};
use crate::exec::{ExecutionGateway, Prompt};
use crate::history::ChatHistory;
use crate::modes::{ChatMode, ModeStore};
use crate::prompts::PromptSet;

const HISTORY_HEADER: &str = "【对话历史】";
const MESSAGE_HEADER: &str = "【用户消息】";

/// Who is speaking; administrators get the admin prompt regardless of mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Speaker {
    #[default]
    User,
    Admin,
}

/// Cheap to clone; clones share the gateway, history and modes.
#[derive(Clone)]
pub struct ChatAgent {
    gateway: ExecutionGateway,
    history: Arc<ChatHistory>,
    modes: Arc<ModeStore>,
    prompts: Arc<PromptSet>,
}

impl ChatAgent {
    pub fn new(gateway: ExecutionGateway, history: ChatHistory, prompts: PromptSet) -> Self {
        Self {
            gateway,
            history: Arc::new(history),
            modes: Arc::new(ModeStore::new()),
            prompts: Arc::new(prompts),
        }
    }

    /// Agent with the configured backend, history directory and custom prompt.
    pub fn from_config(config: &Config, config_path: &Path) -> Result<Self> {
        let history_dir = config::resolve_history_dir(config, config_path);
        let history = ChatHistory::open(history_dir, config.history.max_lines)?;
        let gateway = ExecutionGateway::from_config(&config.executor);
        Ok(Self::new(
            gateway,
            history,
            PromptSet::new(config.custom_prompt.clone()),
        ))
    }

    pub fn gateway(&self) -> &ExecutionGateway {
        &self.gateway
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn modes(&self) -> &ModeStore {
        &self.modes
    }

    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    /// Reply to one message on the calling task. Always returns displayable text.
    pub async fn reply(&self, key: &str, message: &str, speaker: Speaker) -> String {
        let prompt = self.build_prompt(key, message, speaker).await;
        let reply = self.gateway.run(&prompt).await.into_text();
        self.history.append(key, &exchange(message, &reply)).await;
        reply
    }

    /// Queue a reply on the gateway's worker pool and return at once; `callback(reply, key)`
    /// runs once the reply is ready and recorded.
    pub async fn reply_async<F>(&self, key: &str, message: &str, speaker: Speaker, callback: F)
    where
        F: FnOnce(String, String) + Send + 'static,
    {
        let prompt = self.build_prompt(key, message, speaker).await;
        let pending = self.gateway.submit(prompt);
        let history = self.history.clone();
        let key = key.to_string();
        let message = message.to_string();
        tokio::spawn(async move {
            let reply = pending.wait().await.into_text();
            history.append(&key, &exchange(&message, &reply)).await;
            callback(reply, key);
        });
    }

    pub fn set_mode(&self, key: &str, mode: ChatMode) {
        self.modes.set(key, mode);
    }

    pub fn mode(&self, key: &str) -> ChatMode {
        self.modes.get(key)
    }

    pub async fn clear_history(&self, key: &str) -> bool {
        self.history.clear(key).await
    }

    async fn build_prompt(&self, key: &str, message: &str, speaker: Speaker) -> Prompt {
        let system = match speaker {
            Speaker::Admin => self.prompts.admin(),
            Speaker::User => self.prompts.for_mode(self.modes.get(key)),
        };
        let history = self.history.get(key).await;
        Prompt::new(key, compose_prompt(system, &history, message))
    }
}

/// Full backend prompt; the history section is left out when there is none.
pub fn compose_prompt(system: &str, history: &str, message: &str) -> String {
    if history.is_empty() {
        format!("{}\n\n{}\n{}", system, MESSAGE_HEADER, message)
    } else {
        format!(
            "{}\n\n{}\n{}\n\n{}\n{}",
            system, HISTORY_HEADER, history, MESSAGE_HEADER, message
        )
    }
}

fn exchange(message: &str, reply: &str) -> String {
    format!("用户: {}\nAI: {}", message, reply)
}
