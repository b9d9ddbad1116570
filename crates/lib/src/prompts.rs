//! System prompts per chat mode, plus the administrator prompt.

use crate::modes::ChatMode;

pub const CHAT_PROMPT: &str = "你是一个友好、热心的聊天助手。请用简洁自然的中文回复，语气轻松，\
一般不超过三句话。不要使用Markdown格式。";

pub const ADMIN_PROMPT: &str = "你是机器人的管理助手，正在与管理员对话。请准确、直接地回答问题，\
需要时可以给出详细步骤。不要使用Markdown格式。";

pub const COC_PROMPT: &str = "你是一名克苏鲁的呼唤（COC）跑团守秘人。请用沉浸式的叙述推进剧情，\
描述场景与线索，在需要检定时提示玩家掷骰，不要替玩家做决定。";

pub const DND_PROMPT: &str = "你是一名龙与地下城（DND）地下城主。请生动地描述场景和非玩家角色，\
根据玩家行动推进冒险，需要时提示进行属性或技能检定。";

pub const THINK_PROMPT: &str = "你是一位善于深度思考的助手。请先分析问题的关键点，再分步骤推理，\
最后给出清晰的结论。";

/// Prompt selection for one bot: a custom prompt, when configured, replaces the chat prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptSet {
    custom_chat: Option<String>,
}

impl PromptSet {
    pub fn new(custom_chat: Option<String>) -> Self {
        Self {
            custom_chat: custom_chat.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn has_custom(&self) -> bool {
        self.custom_chat.is_some()
    }

    pub fn for_mode(&self, mode: ChatMode) -> &str {
        match mode {
            ChatMode::Chat => self.custom_chat.as_deref().unwrap_or(CHAT_PROMPT),
            ChatMode::Coc => COC_PROMPT,
            ChatMode::Dnd => DND_PROMPT,
            ChatMode::Think => THINK_PROMPT,
        }
    }

    pub fn admin(&self) -> &str {
        ADMIN_PROMPT
    }
}
