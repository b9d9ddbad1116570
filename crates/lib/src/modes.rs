//! Chat modes: which system prompt a conversation uses.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChatMode {
    #[default]
    Chat,
    Coc,
    Dnd,
    Think,
}

impl ChatMode {
    pub const ALL: [ChatMode; 4] = [ChatMode::Chat, ChatMode::Coc, ChatMode::Dnd, ChatMode::Think];

    pub fn name(self) -> &'static str {
        match self {
            ChatMode::Chat => "chat",
            ChatMode::Coc => "coc",
            ChatMode::Dnd => "dnd",
            ChatMode::Think => "think",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ChatMode::Chat => "日常聊天模式",
            ChatMode::Coc => "COC跑团模式",
            ChatMode::Dnd => "DND跑团模式",
            ChatMode::Think => "深度思考模式",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown chat mode: {0}")]
pub struct UnknownMode(pub String);

impl FromStr for ChatMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ChatMode::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

/// Per-conversation mode, in memory. Conversations without an entry are in `ChatMode::Chat`.
#[derive(Debug, Default)]
pub struct ModeStore {
    modes: Mutex<HashMap<String, ChatMode>>,
}

impl ModeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> ChatMode {
        self.lock().get(key).copied().unwrap_or_default()
    }

    pub fn set(&self, key: &str, mode: ChatMode) {
        self.lock().insert(key.to_string(), mode);
    }

    /// Parse and set; unknown names leave the current mode unchanged.
    pub fn set_named(&self, key: &str, name: &str) -> Result<ChatMode, UnknownMode> {
        let mode = name.parse()?;
        self.set(key, mode);
        Ok(mode)
    }

    pub fn reset(&self, key: &str) {
        self.lock().remove(key);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ChatMode>> {
        self.modes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_chat() {
        let store = ModeStore::new();
        assert_eq!(store.get("user_1"), ChatMode::Chat);
    }

    #[test]
    fn set_and_reset() {
        let store = ModeStore::new();
        assert_eq!(store.set_named("user_1", "COC"), Ok(ChatMode::Coc));
        assert_eq!(store.get("user_1"), ChatMode::Coc);
        assert_eq!(store.get("user_2"), ChatMode::Chat);
        store.reset("user_1");
        assert_eq!(store.get("user_1"), ChatMode::Chat);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let store = ModeStore::new();
        store.set("user_1", ChatMode::Think);
        assert_eq!(
            store.set_named("user_1", "poker"),
            Err(UnknownMode("poker".to_string()))
        );
        assert_eq!(store.get("user_1"), ChatMode::Think);
    }

    #[test]
    fn names_round_trip() {
        for mode in ChatMode::ALL {
            assert_eq!(mode.name().parse::<ChatMode>(), Ok(mode));
        }
    }
}
