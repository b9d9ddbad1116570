//! Prompt, failure kinds and the displayable result of one execution.

use std::fmt;

/// Caller-supplied identity threaded through for logging and reply routing. Opaque to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    Id(i64),
    Name(String),
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationKey::Id(id) => write!(f, "{}", id),
            CorrelationKey::Name(name) => f.write_str(name),
        }
    }
}

impl From<i64> for CorrelationKey {
    fn from(id: i64) -> Self {
        CorrelationKey::Id(id)
    }
}

impl From<&str> for CorrelationKey {
    fn from(name: &str) -> Self {
        CorrelationKey::Name(name.to_string())
    }
}

impl From<String> for CorrelationKey {
    fn from(name: String) -> Self {
        CorrelationKey::Name(name)
    }
}

/// Full prompt text for one backend call plus the key it is answered for.
#[derive(Debug, Clone)]
pub struct Prompt {
    key: CorrelationKey,
    text: String,
}

impl Prompt {
    pub fn new(key: impl Into<CorrelationKey>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }

    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// First `max_chars` characters, for diagnostics.
    pub fn preview(&self, max_chars: usize) -> String {
        self.text.chars().take(max_chars).collect()
    }
}

/// Why a fallback string was produced instead of backend output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The backend ran past its deadline.
    Timeout,
    /// The backend binary (or its working directory) does not exist.
    NotFound,
    /// Any other invocation fault.
    Exception,
    /// Output mentioned a failure keyword.
    OutputError,
    /// Nothing left after scrubbing.
    EmptyOutput,
    /// Fewer than the minimum usable bytes after scrubbing.
    ShortOutput,
    /// The worker pool dropped the job or the gateway was shut down.
    InternalAsyncFailure,
    /// Waiting for an async result ran past its own deadline.
    AsyncTimeout,
}

impl FailureKind {
    /// Tag written to the diagnostic log.
    pub fn tag(self) -> &'static str {
        match self {
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::NotFound => "NOT_FOUND",
            FailureKind::Exception => "EXCEPTION",
            FailureKind::OutputError => "OUTPUT_ERROR",
            FailureKind::EmptyOutput => "EMPTY_OUTPUT",
            FailureKind::ShortOutput => "SHORT_OUTPUT",
            FailureKind::InternalAsyncFailure => "INTERNAL_ASYNC_FAILURE",
            FailureKind::AsyncTimeout => "ASYNC_TIMEOUT",
        }
    }

    /// User-facing text substituted for the failed reply.
    pub fn fallback_message(self) -> &'static str {
        match self {
            FailureKind::OutputError | FailureKind::Exception => "抱歉，我有些迷糊，能再说一遍吗？",
            FailureKind::EmptyOutput => "嗯... 刚才好像走神了，能重复一下吗？",
            FailureKind::ShortOutput => "我没太明白，换种说法试试？",
            FailureKind::Timeout => "抱歉，我没听清楚，能再说一次吗？",
            FailureKind::NotFound => "AI命令未安装，请检查配置。",
            FailureKind::InternalAsyncFailure => "抱歉，出了点问题，请重试。",
            FailureKind::AsyncTimeout => "处理超时，请稍后再试。",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Outcome of one prompt: backend text, or a fallback. Always displayable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Reply(String),
    Fallback(FailureKind),
}

impl ExecutionResult {
    pub fn text(&self) -> &str {
        match self {
            ExecutionResult::Reply(s) => s,
            ExecutionResult::Fallback(kind) => kind.fallback_message(),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ExecutionResult::Reply(s) => s,
            ExecutionResult::Fallback(kind) => kind.fallback_message().to_string(),
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, ExecutionResult::Reply(_))
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            ExecutionResult::Reply(_) => None,
            ExecutionResult::Fallback(kind) => Some(*kind),
        }
    }
}
