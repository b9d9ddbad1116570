//! OneBot wire frames: inbound chat events and outbound action requests.
//!
//! Inbound frames are arbitrary JSON objects; only message events are modelled, everything else
//! (heartbeats, notices, meta events) becomes `InboundEvent::Unrecognized`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const SEND_PRIVATE_MSG: &str = "send_private_msg";
pub const SEND_GROUP_MSG: &str = "send_group_msg";

/// A chat message from one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub user_id: i64,
    /// Concatenated text segments, untrimmed.
    pub text: String,
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Private(ChatMessage),
    Group { group_id: i64, message: ChatMessage },
    /// Not a message event (or missing the fields needed to answer it); ignore.
    Unrecognized,
}

/// Where a reply to an event goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTarget {
    Private(i64),
    Group(i64),
}

impl ReplyTarget {
    pub fn action(&self) -> &'static str {
        match self {
            ReplyTarget::Private(_) => SEND_PRIVATE_MSG,
            ReplyTarget::Group(_) => SEND_GROUP_MSG,
        }
    }

    pub fn params(&self, message: &str) -> Value {
        match self {
            ReplyTarget::Private(user_id) => json!({ "user_id": user_id, "message": message }),
            ReplyTarget::Group(group_id) => json!({ "group_id": group_id, "message": message }),
        }
    }
}

/// Outbound frame: `{ "action", "params" }`.
#[derive(Debug, Serialize)]
pub struct ActionFrame<'a> {
    pub action: &'a str,
    pub params: Value,
}

pub fn encode_action(action: &str, params: Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ActionFrame { action, params })
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    post_type: Option<String>,
    #[serde(default)]
    message_type: Option<String>,
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    group_id: Option<Value>,
    #[serde(default)]
    message: Option<MessageBody>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageBody {
    Text(String),
    /// Kept as raw values so one malformed segment does not discard the others.
    Segments(Vec<Value>),
    Other(Value),
}

impl MessageBody {
    fn text(&self) -> String {
        match self {
            MessageBody::Text(s) => s.clone(),
            MessageBody::Segments(segments) => segments.iter().filter_map(segment_text).collect(),
            MessageBody::Other(Value::Null) => String::new(),
            MessageBody::Other(v) => v.to_string(),
        }
    }
}

/// Text of a `{"type": "text", "data": {"text": ...}}` segment; None for anything else.
fn segment_text(segment: &Value) -> Option<&str> {
    if segment.get("type").and_then(Value::as_str) != Some("text") {
        return None;
    }
    segment.get("data")?.get("text")?.as_str()
}

/// Ids arrive as numbers from most gateways and as numeric strings from some.
fn id_of(v: Option<&Value>) -> Option<i64> {
    match v? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl InboundEvent {
    pub fn from_value(value: Value) -> Self {
        let raw: RawEvent = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(_) => return InboundEvent::Unrecognized,
        };
        if raw.post_type.as_deref() != Some("message") {
            return InboundEvent::Unrecognized;
        }
        let Some(user_id) = id_of(raw.user_id.as_ref()) else {
            return InboundEvent::Unrecognized;
        };
        let text = raw.message.as_ref().map(MessageBody::text).unwrap_or_default();
        let message = ChatMessage { user_id, text };
        match (raw.message_type.as_deref(), id_of(raw.group_id.as_ref())) {
            (Some("group"), Some(group_id)) => InboundEvent::Group { group_id, message },
            // Anything else, including a group event without a group id, is answered privately.
            _ => InboundEvent::Private(message),
        }
    }

    pub fn message(&self) -> Option<&ChatMessage> {
        match self {
            InboundEvent::Private(m) | InboundEvent::Group { message: m, .. } => Some(m),
            InboundEvent::Unrecognized => None,
        }
    }

    pub fn reply_target(&self) -> Option<ReplyTarget> {
        match self {
            InboundEvent::Private(m) => Some(ReplyTarget::Private(m.user_id)),
            InboundEvent::Group { group_id, .. } => Some(ReplyTarget::Group(*group_id)),
            InboundEvent::Unrecognized => None,
        }
    }
}
